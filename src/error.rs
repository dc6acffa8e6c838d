// src/error.rs
//! Error taxonomy for the monitoring pipeline.
//!
//! Collaborators (providers, dispatchers, config loading) work with `anyhow`;
//! the pipeline maps their failures into these variants at its seams so the
//! scheduler can decide what aborts a cycle and what is merely collected.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Input did not match `YYYY-MM-DD`, `DD-MM-YYYY` or `DDMMYYYY`.
    #[error("invalid date format: {0:?} (expected YYYY-MM-DD, DD-MM-YYYY or DDMMYYYY)")]
    InvalidDateFormat(String),

    /// A single source could not be fetched; the cycle continues without it.
    #[error("fetch from {feed} failed: {reason}")]
    Fetch { feed: String, reason: String },

    /// Update log or ledger write failed; the rest of the cycle is aborted.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Delivery to one recipient failed; collected, never raised past the pipeline.
    #[error("dispatch to {recipient} failed: {reason}")]
    Dispatch { recipient: String, reason: String },

    /// The cycle task died (panic or cancellation) before reporting.
    #[error("cycle aborted: {0}")]
    Aborted(String),

    /// Unusable configuration or unreadable state at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MonitorError {
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    /// Label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::InvalidDateFormat(_) => "invalid_date",
            MonitorError::Fetch { .. } => "fetch",
            MonitorError::Persistence(_) => "persistence",
            MonitorError::Dispatch { .. } => "dispatch",
            MonitorError::Aborted(_) => "aborted",
            MonitorError::Config(_) => "config",
        }
    }
}
