// src/notify/mod.rs
pub mod email;
pub mod log_only;

use anyhow::Result;
use metrics::counter;
use std::time::Duration;

use crate::error::MonitorError;
use crate::monitor::compose::AlertNotification;
use crate::recipients::Recipient;

pub use email::EmailDispatcher;
pub use log_only::LogDispatcher;

/// Delivery boundary for composed alerts. Transport is the implementor's business.
#[async_trait::async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn deliver(&self, recipient: &Recipient, notification: &AlertNotification) -> Result<()>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: Vec<Recipient>,
    pub failures: Vec<MonitorError>,
}

impl DispatchReport {
    pub fn any_delivered(&self) -> bool {
        !self.delivered.is_empty()
    }
}

/// Deliver to every recipient in turn, each under `timeout`.
///
/// A failed or timed-out delivery is collected and the next recipient is
/// still attempted.
pub async fn dispatch_all(
    dispatcher: &dyn AlertDispatcher,
    recipients: &[Recipient],
    notification: &AlertNotification,
    timeout: Duration,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for r in recipients {
        let reason = match tokio::time::timeout(timeout, dispatcher.deliver(r, notification)).await {
            Ok(Ok(())) => {
                tracing::info!(target: "notify", channel = dispatcher.name(), to = %r.email, "alert sent");
                report.delivered.push(r.clone());
                continue;
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(_) => format!("timed out after {timeout:?}"),
        };
        tracing::error!(target: "notify", channel = dispatcher.name(), to = %r.email, %reason, "alert not sent");
        counter!("monitor_dispatch_failures_total").increment(1);
        report.failures.push(MonitorError::Dispatch {
            recipient: r.email.clone(),
            reason,
        });
    }
    report
}
