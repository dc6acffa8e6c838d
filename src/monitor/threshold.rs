// src/monitor/threshold.rs
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::ingest::types::UpdateRecord;
use crate::monitor::merge::UpdateLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertDecision {
    pub fire: bool,
    pub matched_count: usize,
}

/// Lower bound of the window; clamps to the earliest representable instant.
fn window_start(window_days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_signed(Duration::days(i64::from(window_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn in_window(r: &UpdateRecord, from: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    r.discovered_at >= from && r.discovered_at <= now
}

/// Count discoveries in `[now - window_days, now]` across all sources and
/// fire when the count reaches `threshold`.
///
/// Uses `discovered_at`, never the nominal publication date. Pure: the whole
/// log is rescanned on every call.
pub fn evaluate(log: &UpdateLog, window_days: u32, threshold: usize, now: DateTime<Utc>) -> AlertDecision {
    let from = window_start(window_days, now);
    let matched_count = log
        .records()
        .filter(|r| in_window(r, from, now))
        .count();
    AlertDecision {
        fire: matched_count >= threshold,
        matched_count,
    }
}

/// In-window records grouped by source, discovery order kept.
pub fn recent_updates(
    log: &UpdateLog,
    window_days: u32,
    now: DateTime<Utc>,
) -> BTreeMap<String, Vec<UpdateRecord>> {
    let from = window_start(window_days, now);
    log.iter()
        .map(|(source, records)| {
            let recent: Vec<_> = records
                .iter()
                .filter(|r| in_window(r, from, now))
                .cloned()
                .collect();
            (source.to_string(), recent)
        })
        .filter(|(_, v)| !v.is_empty())
        .collect()
}
