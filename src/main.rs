//! EU Compliance Monitor: binary entrypoint.
//! Boots the Axum HTTP server and the background monitoring loop.

use std::sync::Arc;

use eu_compliance_monitor::analyze::ComplianceAnalyzer;
use eu_compliance_monitor::api::{self, AppState};
use eu_compliance_monitor::metrics::Metrics;
use eu_compliance_monitor::{build_pipeline, AppConfig, SchedulerHandle};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - MONITOR_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("MONITOR_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("eu_compliance_monitor=info,warn"));

    // The runtime may already own the global subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    // Config or state problems stop startup here; the loop never runs on bad input.
    let cfg = AppConfig::load_default()?;
    let pipeline = build_pipeline(&cfg)?;
    let metrics = Metrics::init(cfg.monitoring.alert_threshold, cfg.monitoring.window_days)?;

    let scheduler = SchedulerHandle::new(Arc::new(pipeline));
    scheduler.spawn_loop(cfg.monitoring.interval());
    tracing::info!(
        interval_hours = cfg.monitoring.check_interval_hours,
        threshold = cfg.monitoring.alert_threshold,
        window_days = cfg.monitoring.window_days,
        "regulatory monitoring scheduled"
    );

    let analyzer = ComplianceAnalyzer::from_config(&cfg.deepseek);
    let router = api::router(AppState::new(scheduler, analyzer)).merge(metrics.router());

    Ok(router.into())
}
