// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod monitor;
pub mod notify;
pub mod recipients;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::AppConfig;
pub use crate::error::MonitorError;
pub use crate::monitor::{MonitorPipeline, SchedulerHandle};

use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ingest::providers::eurlex::EurLexDailyProvider;
use crate::ingest::types::UpdateFetcher;
use crate::monitor::PipelineSettings;
use crate::notify::{AlertDispatcher, EmailDispatcher, LogDispatcher};
use crate::store::{JsonFileStore, Stores};

/// Fetchers for every configured source.
pub fn build_fetchers(cfg: &AppConfig) -> anyhow::Result<Vec<Box<dyn UpdateFetcher>>> {
    let eurlex = EurLexDailyProvider::from_url(
        cfg.monitoring.eurlex_url.clone(),
        cfg.monitoring.fetch_timeout(),
    )?;
    Ok(vec![Box::new(eurlex)])
}

/// SMTP when a relay is configured, otherwise log-only delivery.
pub fn build_dispatcher(cfg: &AppConfig) -> anyhow::Result<Arc<dyn AlertDispatcher>> {
    if cfg.email.is_configured() {
        let email = EmailDispatcher::from_config(&cfg.email)?;
        info!(
            host = %cfg.email.smtp_server,
            port = cfg.email.smtp_port,
            "SMTP dispatcher ready"
        );
        Ok(Arc::new(email))
    } else {
        warn!("SMTP not configured; alerts will only be logged");
        Ok(Arc::new(LogDispatcher))
    }
}

/// Validate config, open state under `storage.data_dir` and wire the pipeline.
///
/// Fails on invalid settings or unreadable state, so the caller never starts
/// a loop that could not persist anything.
pub fn build_pipeline(cfg: &AppConfig) -> anyhow::Result<MonitorPipeline> {
    cfg.validate()?;
    let dir = &cfg.storage.data_dir;
    let store = JsonFileStore::open(dir)
        .map_err(|e| MonitorError::Config(format!("state under {}: {e:#}", dir.display())))?;
    info!(data_dir = %dir.display(), "state opened");

    Ok(MonitorPipeline::new(
        build_fetchers(cfg).context("building fetchers")?,
        build_dispatcher(cfg).context("building dispatcher")?,
        Stores::shared(Arc::new(store)),
        PipelineSettings::from(cfg),
    ))
}
