// src/monitor/mod.rs
//! The monitoring core: dedup/merge, threshold evaluation, alert composition,
//! alert ledger, the cycle pipeline and the scheduler that drives it.

pub mod compose;
pub mod ledger;
pub mod merge;
pub mod pipeline;
pub mod scheduler;
pub mod threshold;

pub use compose::AlertNotification;
pub use ledger::{AlertEvent, AlertLedger};
pub use merge::{merge, MergeOutcome, UpdateLog};
pub use pipeline::{CycleReport, MonitorPipeline, PipelineSettings};
pub use scheduler::{CycleOutcome, SchedulerHandle, SchedulerState};
pub use threshold::{evaluate, AlertDecision};

use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;

/// Register help text for the cycle series once per process.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_cycles_total", "Monitoring cycles run.");
        describe_counter!(
            "monitor_cycle_failures_total",
            "Cycles aborted by a persistence error or a panic."
        );
        describe_counter!(
            "monitor_cycles_skipped_total",
            "Triggers dropped because a cycle was already running."
        );
        describe_counter!("monitor_updates_added_total", "New updates merged into the log.");
        describe_counter!("monitor_alerts_fired_total", "Alerts fired.");
        describe_counter!(
            "monitor_dispatch_failures_total",
            "Per-recipient delivery failures."
        );
        describe_gauge!("monitor_last_cycle_ts", "Unix time of the last finished cycle.");
        describe_gauge!("monitor_last_alert_ts", "Unix time of the last fired alert.");
    });
}
