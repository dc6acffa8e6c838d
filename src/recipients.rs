// src/recipients.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A delivery address for alerts. Client lifecycle lives elsewhere; the
/// pipeline only needs where to send and when it last did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl Recipient {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            email: email.into(),
            last_notified_at: None,
        }
    }

    /// Build after checking the address parses as a mailbox.
    pub fn parse(email: &str) -> Result<Self> {
        let email = email.trim();
        email
            .parse::<lettre::message::Mailbox>()
            .with_context(|| format!("invalid e-mail address {email:?}"))?;
        Ok(Self::new(email))
    }
}
