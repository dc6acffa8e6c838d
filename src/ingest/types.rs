// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One item as returned by a fetcher, before the merge engine stamps it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FetchedUpdate {
    pub source: String,  // e.g. "eur-lex"
    pub title: String,   // identity within a source
    pub date: String,    // nominal OJ date, YYYY-MM-DD
    pub content: String, // short excerpt
    #[serde(default)]
    pub url: String,
}

/// A record in the persisted update log. Immutable once appended.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct UpdateRecord {
    pub source: String,
    pub title: String,
    pub date: String,
    pub content: String,
    #[serde(default)]
    pub url: String,
    pub discovered_at: DateTime<Utc>,
}

impl UpdateRecord {
    pub fn discovered(update: FetchedUpdate, now: DateTime<Utc>) -> Self {
        Self {
            source: update.source,
            title: update.title,
            date: update.date,
            content: update.content,
            url: update.url,
            discovered_at: now,
        }
    }
}

/// Fetched items keyed by source, each list in fetch order.
pub type FetchBatch = BTreeMap<String, Vec<FetchedUpdate>>;

/// Boundary to a regulatory publication channel.
#[async_trait::async_trait]
pub trait UpdateFetcher: Send + Sync {
    /// Items published for `oj_date` (compact `DDMMYYYY`). Empty when nothing was published.
    async fn fetch(&self, oj_date: &str) -> Result<Vec<FetchedUpdate>>;
    fn source(&self) -> &str;
}
