use anyhow::Result;

use super::AlertDispatcher;
use crate::monitor::compose::AlertNotification;
use crate::recipients::Recipient;

/// Logs instead of sending. Used when no SMTP relay is configured.
#[derive(Debug, Default, Clone)]
pub struct LogDispatcher;

#[async_trait::async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn deliver(&self, recipient: &Recipient, n: &AlertNotification) -> Result<()> {
        tracing::info!(
            target: "notify",
            to = %recipient.email,
            subject = %n.subject,
            sections = n.sections.len(),
            items = n.item_count(),
            "alert (log only, SMTP disabled)"
        );
        tracing::debug!(target: "notify", body = %n.text_body());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
