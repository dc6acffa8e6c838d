// src/monitor/merge.rs
//! Deduplication & merge of fetched items into the per-source update log.
//!
//! Identity is `(source, title)` with exact title equality. Two items with the
//! same title from the same source are the same update even if their content
//! differs. Existing entries are never removed or reordered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::ingest::types::{FetchBatch, UpdateRecord};

/// Source name -> records in discovery order (newest last).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateLog(BTreeMap<String, Vec<UpdateRecord>>);

impl UpdateLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self, source: &str) -> &[UpdateRecord] {
        self.0.get(source).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[UpdateRecord])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Every record across every source.
    pub fn records(&self) -> impl Iterator<Item = &UpdateRecord> {
        self.0.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<BTreeMap<String, Vec<UpdateRecord>>> for UpdateLog {
    fn from(m: BTreeMap<String, Vec<UpdateRecord>>) -> Self {
        Self(m)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub log: UpdateLog,
    pub added: usize,
    pub sources_changed: BTreeSet<String>,
}

/// Merge `incoming` into a copy of `existing`, stamping new records with `now`.
///
/// Membership is checked against the whole history of the source, including
/// records appended earlier in this same call, so duplicates inside one batch
/// collapse to a single entry. `existing` is left untouched; the caller
/// decides whether the returned log becomes durable.
pub fn merge(existing: &UpdateLog, incoming: FetchBatch, now: DateTime<Utc>) -> MergeOutcome {
    let mut log = existing.clone();
    let mut added = 0usize;
    let mut sources_changed = BTreeSet::new();

    for (source, items) in incoming {
        if items.is_empty() {
            continue;
        }
        let entries = log.0.entry(source.clone()).or_default();
        let mut seen: HashSet<String> = entries.iter().map(|r| r.title.clone()).collect();

        for item in items {
            if !seen.insert(item.title.clone()) {
                continue;
            }
            tracing::info!(target: "monitor", source = %source, title = %item.title, "new update");
            let mut record = UpdateRecord::discovered(item, now);
            record.source = source.clone();
            entries.push(record);
            added += 1;
            sources_changed.insert(source.clone());
        }
    }

    // A source that only brought duplicates must not leave an empty key behind.
    log.0.retain(|_, v| !v.is_empty());

    MergeOutcome {
        log,
        added,
        sources_changed,
    }
}
