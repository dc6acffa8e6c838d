// src/monitor/pipeline.rs
//! One monitoring cycle: fetch -> merge -> persist -> evaluate -> dispatch -> record.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::{MonitorError, Result};
use crate::ingest::date::to_oj_date;
use crate::ingest::fetch_all;
use crate::ingest::types::UpdateFetcher;
use crate::monitor::compose::compose;
use crate::monitor::ledger::{AlertEvent, AlertLedger};
use crate::monitor::merge::{merge, UpdateLog};
use crate::monitor::threshold::{evaluate, AlertDecision};
use crate::notify::{dispatch_all, AlertDispatcher};
use crate::store::Stores;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub alert_threshold: usize,
    pub window_days: u32,
    pub fetch_timeout: Duration,
    pub dispatch_timeout: Duration,
    /// Query this OJ date instead of the cycle's own date.
    pub oj_date_override: Option<String>,
    pub archive_dir: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            alert_threshold: 3,
            window_days: 7,
            fetch_timeout: Duration::from_secs(60),
            dispatch_timeout: Duration::from_secs(30),
            oj_date_override: None,
            archive_dir: None,
        }
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(cfg: &AppConfig) -> Self {
        let m = &cfg.monitoring;
        Self {
            alert_threshold: m.alert_threshold,
            window_days: m.window_days,
            fetch_timeout: m.fetch_timeout(),
            dispatch_timeout: m.dispatch_timeout(),
            oj_date_override: m.oj_date.clone(),
            archive_dir: m
                .archive_scrapes
                .then(|| cfg.storage.data_dir.join("scraped")),
        }
    }
}

/// What happened in one cycle. Collected failures never abort the cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub oj_date: String,
    pub fetched: usize,
    pub added: usize,
    pub sources_changed: BTreeSet<String>,
    pub fetch_failures: Vec<MonitorError>,
    pub decision: Option<AlertDecision>,
    pub alert: Option<AlertEvent>,
    pub dispatch_failures: Vec<MonitorError>,
}

pub struct MonitorPipeline {
    fetchers: Vec<Box<dyn UpdateFetcher>>,
    dispatcher: Arc<dyn AlertDispatcher>,
    stores: Stores,
    ledger: AlertLedger,
    settings: PipelineSettings,
}

impl MonitorPipeline {
    pub fn new(
        fetchers: Vec<Box<dyn UpdateFetcher>>,
        dispatcher: Arc<dyn AlertDispatcher>,
        stores: Stores,
        settings: PipelineSettings,
    ) -> Self {
        let ledger = AlertLedger::new(stores.ledger.clone());
        Self {
            fetchers,
            dispatcher,
            stores,
            ledger,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &AlertLedger {
        &self.ledger
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn load_log(&self) -> Result<UpdateLog> {
        self.stores
            .updates
            .load()
            .map_err(|e| MonitorError::persistence(format!("update log: {e:#}")))
    }

    /// Configured override if it parses, otherwise the date of `now`.
    fn oj_date_for(&self, now: DateTime<Utc>) -> String {
        if let Some(raw) = &self.settings.oj_date_override {
            match to_oj_date(raw) {
                Ok(d) => return d,
                Err(e) => {
                    tracing::warn!(target: "monitor", error = %e, "oj_date override ignored")
                }
            }
        }
        now.format("%d%m%Y").to_string()
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        crate::monitor::ensure_metrics_described();
        let oj_date = self.oj_date_for(now);
        tracing::info!(target: "monitor", %oj_date, "checking for regulatory updates");

        let fetched = fetch_all(
            &self.fetchers,
            &oj_date,
            self.settings.fetch_timeout,
            self.settings.archive_dir.as_deref(),
        )
        .await;

        let mut report = CycleReport {
            oj_date,
            fetched: fetched.fetched(),
            added: 0,
            sources_changed: BTreeSet::new(),
            fetch_failures: fetched.failures,
            decision: None,
            alert: None,
            dispatch_failures: Vec::new(),
        };

        let existing = self.load_log()?;
        let merged = merge(&existing, fetched.batch, now);
        report.added = merged.added;
        report.sources_changed = merged.sources_changed.clone();

        if merged.added == 0 {
            tracing::info!(target: "monitor", fetched = report.fetched, "no new updates");
            return Ok(report);
        }

        self.stores
            .updates
            .replace(&merged.log)
            .map_err(|e| MonitorError::persistence(format!("update log: {e:#}")))?;
        counter!("monitor_updates_added_total").increment(merged.added as u64);
        tracing::info!(target: "monitor", added = merged.added, total = merged.log.len(), "saved updated regulatory data");

        let decision = evaluate(
            &merged.log,
            self.settings.window_days,
            self.settings.alert_threshold,
            now,
        );
        report.decision = Some(decision);
        if !decision.fire {
            tracing::info!(
                target: "monitor",
                matched = decision.matched_count,
                threshold = self.settings.alert_threshold,
                "below alert threshold"
            );
            return Ok(report);
        }

        tracing::info!(
            target: "monitor",
            matched = decision.matched_count,
            window_days = self.settings.window_days,
            "alert threshold reached"
        );
        counter!("monitor_alerts_fired_total").increment(1);

        let notification = compose(
            &merged.log,
            &merged.sources_changed,
            decision.matched_count,
            now,
        );
        let recipients = match self.stores.recipients.recipients() {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(target: "monitor", error = ?e, "recipient registry unreadable");
                report.dispatch_failures.push(MonitorError::Dispatch {
                    recipient: "*".to_string(),
                    reason: format!("recipient registry: {e:#}"),
                });
                Vec::new()
            }
        };

        let dispatched = dispatch_all(
            self.dispatcher.as_ref(),
            &recipients,
            &notification,
            self.settings.dispatch_timeout,
        )
        .await;

        for mut r in dispatched.delivered.iter().cloned() {
            r.last_notified_at = Some(now);
            if let Err(e) = self.stores.recipients.upsert(r) {
                tracing::warn!(target: "monitor", error = ?e, "last_notified_at not saved");
            }
        }

        let event = AlertEvent::new(now, decision.matched_count, dispatched.any_delivered());
        report.dispatch_failures.extend(dispatched.failures);
        self.ledger.record(&event)?;
        report.alert = Some(event);

        gauge!("monitor_last_alert_ts").set(now.timestamp() as f64);
        Ok(report)
    }
}
