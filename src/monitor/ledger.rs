// src/monitor/ledger.rs
//! Append-only alert history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{MonitorError, Result};
use crate::store::AlertLedgerStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// UUID v7: time-ordered and unique even for alerts fired in the same second.
    pub id: Uuid,
    pub fired_at: DateTime<Utc>,
    pub matched_count: usize,
    pub dispatched: bool,
}

impl AlertEvent {
    pub fn new(fired_at: DateTime<Utc>, matched_count: usize, dispatched: bool) -> Self {
        Self {
            id: Uuid::now_v7(),
            fired_at,
            matched_count,
            dispatched,
        }
    }
}

#[derive(Clone)]
pub struct AlertLedger {
    store: Arc<dyn AlertLedgerStore>,
}

impl AlertLedger {
    pub fn new(store: Arc<dyn AlertLedgerStore>) -> Self {
        Self { store }
    }

    /// Durably append `event`. Prior events are never touched.
    pub fn record(&self, event: &AlertEvent) -> Result<()> {
        self.store
            .append(event)
            .map_err(|e| MonitorError::persistence(format!("alert ledger: {e:#}")))?;
        tracing::info!(
            target: "monitor",
            id = %event.id,
            matched = event.matched_count,
            dispatched = event.dispatched,
            "alert recorded"
        );
        Ok(())
    }

    /// Every recorded event in firing order.
    pub fn history(&self) -> Result<Vec<AlertEvent>> {
        self.store
            .events()
            .map_err(|e| MonitorError::persistence(format!("alert ledger: {e:#}")))
    }
}
