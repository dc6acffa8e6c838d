use anyhow::{Context, Result};
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use std::time::Duration;

use super::AlertDispatcher;
use crate::config::EmailConfig;
use crate::monitor::compose::AlertNotification;
use crate::recipients::Recipient;

pub struct EmailDispatcher {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailDispatcher {
    /// STARTTLS relay with login credentials, as most hosted SMTP services expect.
    pub fn from_config(cfg: &EmailConfig) -> Result<Self> {
        let creds = Credentials::new(cfg.username.clone(), cfg.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_server)
            .with_context(|| format!("invalid SMTP host {:?}", cfg.smtp_server))?
            .port(cfg.smtp_port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(30)))
            .build();

        let from_addr = cfg.from.as_deref().unwrap_or(&cfg.username);
        let from = from_addr
            .parse()
            .with_context(|| format!("invalid sender address {from_addr:?}"))?;

        Ok(Self { mailer, from })
    }
}

#[async_trait::async_trait]
impl AlertDispatcher for EmailDispatcher {
    async fn deliver(&self, recipient: &Recipient, n: &AlertNotification) -> Result<()> {
        let to: Mailbox = recipient
            .email
            .parse()
            .with_context(|| format!("invalid recipient {:?}", recipient.email))?;

        let msg = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(n.subject.clone())
            .multipart(MultiPart::alternative_plain_html(n.text_body(), n.html_body()))
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
