//! SMTP email alerts via `lettre`.

use std::fmt;

use anyhow::Context;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{Alert, AlertSender};
use crate::config::SmtpConfig;

/// Sends plain-text alert emails through an SMTP relay.
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
}

impl SmtpSender {
    /// Builds a relay transport (STARTTLS/TLS) from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay host or sender address is invalid.
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?.port(config.port);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("invalid ALERT_FROM address: {}", config.from))?;
        Ok(Self {
            transport: builder.build(),
            from,
            host: config.host.clone(),
        })
    }
}

impl fmt::Debug for SmtpSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSender")
            .field("host", &self.host)
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AlertSender for SmtpSender {
    async fn send(&self, target: &str, alert: &Alert) -> anyhow::Result<()> {
        let to: Mailbox = target
            .parse()
            .with_context(|| format!("invalid alert email: {target}"))?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&alert.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(alert.body.clone())?;
        self.transport.send(email).await?;
        Ok(())
    }
}
