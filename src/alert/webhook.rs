//! Webhook alerts via `reqwest`.
//!
//! Slack incoming-webhook URLs get Slack's `{"text": ...}` body; every other
//! URL receives a structured JSON payload.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Alert, AlertSender};

const SLACK_HOST: &str = "hooks.slack.com";

/// Posts alerts as JSON to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookSender {
    client: reqwest::Client,
}

impl WebhookSender {
    /// Creates a sender whose requests time out after `timeout_secs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;
        Ok(Self { client })
    }
}

fn is_slack(url: &reqwest::Url) -> bool {
    url.host_str() == Some(SLACK_HOST)
}

fn payload(url: &reqwest::Url, alert: &Alert) -> Value {
    if is_slack(url) {
        json!({ "text": format!("*{}*\n{}", alert.subject, alert.body) })
    } else {
        json!({
            "event": "monitor.down",
            "subject": alert.subject,
            "message": alert.body,
            "monitor": {
                "id": alert.monitor_id,
                "name": alert.monitor_name,
                "slug": alert.slug,
            },
            "incident": {
                "id": alert.incident_id,
                "started_at": alert.started_at.to_rfc3339(),
            },
        })
    }
}

#[async_trait]
impl AlertSender for WebhookSender {
    async fn send(&self, target: &str, alert: &Alert) -> anyhow::Result<()> {
        let url = reqwest::Url::parse(target)?;
        let body = payload(&url, alert);
        self.client
            .post(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Incident, Monitor, NewMonitor};
    use chrono::Utc;

    fn alert() -> Alert {
        let spec = NewMonitor {
            name: "db dump".to_string(),
            slug: Some("db-dump".to_string()),
            interval_secs: 3600,
            ..NewMonitor::default()
        };
        let Ok(monitor) = Monitor::create(spec, Utc::now()) else {
            panic!("valid monitor rejected");
        };
        let incident = Incident::open(monitor.id, Utc::now());
        Alert::down(&monitor, &incident)
    }

    #[test]
    fn slack_urls_get_text_body() {
        let Ok(url) = reqwest::Url::parse("https://hooks.slack.com/services/T/B/X") else {
            panic!("bad url");
        };
        let body = payload(&url, &alert());
        let Some(text) = body.get("text").and_then(Value::as_str) else {
            panic!("missing text: {body}");
        };
        assert!(text.starts_with("*[cronwatch] db dump is DOWN*"));
        assert!(body.get("event").is_none());
    }

    #[test]
    fn other_urls_get_structured_body() {
        let Ok(url) = reqwest::Url::parse("https://example.com/hook") else {
            panic!("bad url");
        };
        let body = payload(&url, &alert());
        assert_eq!(body.get("event").and_then(Value::as_str), Some("monitor.down"));
        assert_eq!(
            body.pointer("/monitor/slug").and_then(Value::as_str),
            Some("db-dump")
        );
    }
}
