//! Alert delivery for monitors that go down.
//!
//! An [`AlertSender`] delivers one rendered [`Alert`] to one target (an
//! email address or a webhook URL). The [`AlertDispatcher`] fans an incident
//! out to whichever targets the monitor has configured and reports which
//! channels accepted it. Delivery is best-effort: failures are logged and
//! counted, never retried here.

pub mod email;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::ServiceConfig;
use crate::domain::{AlertChannel, Incident, IncidentId, Monitor, MonitorId};

pub use email::SmtpSender;
pub use webhook::WebhookSender;

/// A rendered down alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// One-line subject.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Monitor that went down.
    pub monitor_id: MonitorId,
    /// Monitor name.
    pub monitor_name: String,
    /// Monitor ping slug.
    pub slug: String,
    /// Incident that was opened.
    pub incident_id: IncidentId,
    /// When the monitor went down.
    pub started_at: DateTime<Utc>,
}

impl Alert {
    /// Renders the down alert for `monitor` and `incident`.
    #[must_use]
    pub fn down(monitor: &Monitor, incident: &Incident) -> Self {
        let subject = format!("[cronwatch] {} is DOWN", monitor.name);
        let body = format!(
            "Monitor \"{name}\" ({slug}) is DOWN.\n\
             Last ping: {last_ping}\n\
             Expected by: {deadline}\n\
             Grace period: {grace}s\n\
             Down since: {started}",
            name = monitor.name,
            slug = monitor.slug,
            last_ping = format_time(monitor.last_ping_at),
            deadline = format_time(monitor.next_expected_at),
            grace = monitor.schedule.grace_secs(),
            started = incident.started_at.to_rfc3339(),
        );
        Self {
            subject,
            body,
            monitor_id: monitor.id,
            monitor_name: monitor.name.clone(),
            slug: monitor.slug.to_string(),
            incident_id: incident.id,
            started_at: incident.started_at,
        }
    }
}

fn format_time(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
}

/// Delivers alerts over one channel.
#[async_trait]
pub trait AlertSender: Send + Sync + std::fmt::Debug {
    /// Delivers `alert` to `target`.
    ///
    /// # Errors
    ///
    /// Any transport or provider failure.
    async fn send(&self, target: &str, alert: &Alert) -> anyhow::Result<()>;
}

/// Channels that accepted an alert, and how many deliveries failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Channels that accepted the alert.
    pub delivered: Vec<AlertChannel>,
    /// Deliveries that failed.
    pub failed: usize,
}

/// Fans a down alert out to a monitor's configured targets.
#[derive(Debug, Clone, Default)]
pub struct AlertDispatcher {
    email: Option<Arc<dyn AlertSender>>,
    webhook: Option<Arc<dyn AlertSender>>,
}

impl AlertDispatcher {
    /// Creates a dispatcher with no channels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the dispatcher from configuration: SMTP when a host is set,
    /// webhooks always.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP relay or HTTP client cannot be built.
    pub fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let mut dispatcher =
            Self::new().with_webhook(Arc::new(WebhookSender::new(config.webhook_timeout_secs)?));
        if let Some(smtp) = &config.smtp {
            dispatcher = dispatcher.with_email(Arc::new(SmtpSender::new(smtp)?));
        } else {
            tracing::info!("SMTP_HOST not set, email alerts disabled");
        }
        Ok(dispatcher)
    }

    /// Sets the email sender.
    #[must_use]
    pub fn with_email(mut self, sender: Arc<dyn AlertSender>) -> Self {
        self.email = Some(sender);
        self
    }

    /// Sets the webhook sender.
    #[must_use]
    pub fn with_webhook(mut self, sender: Arc<dyn AlertSender>) -> Self {
        self.webhook = Some(sender);
        self
    }

    /// Sends the down alert for `incident` to every target `monitor` has.
    pub async fn dispatch(&self, monitor: &Monitor, incident: &Incident) -> DispatchReport {
        let mut report = DispatchReport::default();
        if monitor.alerts.is_empty() {
            tracing::debug!(monitor_id = %monitor.id, "no alert targets configured");
            return report;
        }
        let alert = Alert::down(monitor, incident);

        let deliveries = [
            (AlertChannel::Email, monitor.alerts.email.as_deref(), &self.email),
            (
                AlertChannel::Webhook,
                monitor.alerts.webhook_url.as_deref(),
                &self.webhook,
            ),
        ];
        for (channel, target, sender) in deliveries {
            let Some(target) = target else {
                continue;
            };
            let Some(sender) = sender else {
                tracing::warn!(
                    monitor_id = %monitor.id,
                    channel = channel.as_str(),
                    "alert target set but channel is not configured"
                );
                report.failed += 1;
                continue;
            };
            match sender.send(target, &alert).await {
                Ok(()) => {
                    tracing::info!(
                        monitor_id = %monitor.id,
                        incident_id = %incident.id,
                        channel = channel.as_str(),
                        "down alert delivered"
                    );
                    report.delivered.push(channel);
                }
                Err(e) => {
                    tracing::warn!(
                        monitor_id = %monitor.id,
                        incident_id = %incident.id,
                        channel = channel.as_str(),
                        error = %e,
                        "down alert failed"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}
