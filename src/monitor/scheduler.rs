// src/monitor/scheduler.rs
//! Idle/Running loop around the pipeline.
//!
//! Timer ticks and manual triggers share one gate. While a cycle is running,
//! further requests are skipped, not queued. A cycle that fails or panics
//! is logged and the loop carries on.

use chrono::Utc;
use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::MonitorError;
use crate::monitor::pipeline::{CycleReport, MonitorPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Failed(MonitorError),
    /// A cycle was already in flight.
    Skipped,
}

/// Releases the Running flag however the cycle ends, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct SchedulerHandle {
    pipeline: Arc<MonitorPipeline>,
    running: Arc<AtomicBool>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    pub fn new(pipeline: Arc<MonitorPipeline>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            pipeline,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(tx),
        }
    }

    pub fn pipeline(&self) -> &Arc<MonitorPipeline> {
        &self.pipeline
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    fn try_begin(&self) -> Option<RunningGuard> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunningGuard(self.running.clone()))
    }

    /// Run one cycle now and wait for it, unless one is already running.
    pub async fn run_now(&self) -> CycleOutcome {
        match self.try_begin() {
            Some(guard) => self.clone().run_guarded(guard).await,
            None => skipped(),
        }
    }

    /// Start a cycle in the background. `false` when one is already running.
    pub fn trigger(&self) -> bool {
        match self.try_begin() {
            Some(guard) => {
                let this = self.clone();
                tokio::spawn(async move {
                    this.run_guarded(guard).await;
                });
                true
            }
            None => {
                skipped();
                false
            }
        }
    }

    /// Stop the loop once the current cycle (if any) has finished.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    async fn run_guarded(self, guard: RunningGuard) -> CycleOutcome {
        let pipeline = self.pipeline.clone();
        // Own task so a panic inside the cycle surfaces as a JoinError here.
        let joined = tokio::spawn(async move {
            let _guard = guard;
            pipeline.run_cycle(Utc::now()).await
        })
        .await;

        counter!("monitor_cycles_total").increment(1);
        gauge!("monitor_last_cycle_ts").set(Utc::now().timestamp() as f64);

        match joined {
            Ok(Ok(report)) => {
                tracing::info!(
                    target: "monitor",
                    oj_date = %report.oj_date,
                    fetched = report.fetched,
                    added = report.added,
                    fetch_failures = report.fetch_failures.len(),
                    alert = report.alert.is_some(),
                    dispatch_failures = report.dispatch_failures.len(),
                    "cycle completed"
                );
                CycleOutcome::Completed(report)
            }
            Ok(Err(e)) => {
                tracing::error!(target: "monitor", error = %e, kind = e.kind(), "cycle failed");
                counter!("monitor_cycle_failures_total").increment(1);
                CycleOutcome::Failed(e)
            }
            Err(join_err) => {
                tracing::error!(target: "monitor", error = %join_err, "cycle panicked");
                counter!("monitor_cycle_failures_total").increment(1);
                CycleOutcome::Failed(MonitorError::Aborted(join_err.to_string()))
            }
        }
    }

    /// Periodic loop. The first tick fires immediately.
    pub fn spawn_loop(&self, interval: Duration) -> JoinHandle<()> {
        let this = self.clone();
        let mut stop = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(target: "monitor", ?interval, "monitoring started");
            loop {
                if *stop.borrow_and_update() {
                    break;
                }
                tokio::select! {
                    _ = ticker.tick() => {
                        this.run_now().await;
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!(target: "monitor", "monitoring stopped");
        })
    }
}

fn skipped() -> CycleOutcome {
    tracing::info!(target: "monitor", "cycle already running; request skipped");
    counter!("monitor_cycles_skipped_total").increment(1);
    CycleOutcome::Skipped
}
