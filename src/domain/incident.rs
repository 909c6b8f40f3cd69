//! Incidents: recorded down periods of a monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{IncidentId, MonitorId};

/// Alert channel that accepted a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertChannel {
    /// SMTP email.
    Email,
    /// HTTP webhook (Slack included).
    Webhook,
}

impl AlertChannel {
    /// Returns the lowercase wire/storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Webhook => "webhook",
        }
    }

    /// Parses the storage name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(Self::Email),
            "webhook" => Some(Self::Webhook),
            _ => None,
        }
    }
}

/// A down period. At most one incident per monitor has `resolved_at == None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Record identifier.
    pub id: IncidentId,
    /// Owning monitor.
    pub monitor_id: MonitorId,
    /// When the monitor went down.
    pub started_at: DateTime<Utc>,
    /// When the incident was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Channels that accepted the down alert.
    pub notified: Vec<AlertChannel>,
}

impl Incident {
    /// Opens a new incident at `started_at`.
    #[must_use]
    pub fn open(monitor_id: MonitorId, started_at: DateTime<Utc>) -> Self {
        Self {
            id: IncidentId::new(),
            monitor_id,
            started_at,
            resolved_at: None,
            notified: Vec::new(),
        }
    }

    /// Returns `true` while unresolved.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}
