//! Append-only ping records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{MonitorId, PingId};

const MAX_USER_AGENT_LENGTH: usize = 256;

/// Kind of inbound signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PingKind {
    /// The job finished; advances the deadline.
    Heartbeat,
    /// The job started; used for duration tracking only.
    Start,
}

impl PingKind {
    /// Returns the lowercase wire/storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Start => "start",
        }
    }

    /// Parses the storage name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "heartbeat" => Some(Self::Heartbeat),
            "start" => Some(Self::Start),
            _ => None,
        }
    }
}

/// Caller metadata captured with each ping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PingSource {
    /// Caller IP address as reported by the edge.
    pub ip: Option<String>,
    /// Caller user agent, truncated.
    pub user_agent: Option<String>,
}

impl PingSource {
    /// Builds caller metadata, truncating the user agent.
    #[must_use]
    pub fn new(ip: Option<String>, user_agent: Option<String>) -> Self {
        let user_agent =
            user_agent.map(|ua| ua.chars().take(MAX_USER_AGENT_LENGTH).collect::<String>());
        Self { ip, user_agent }
    }
}

/// An immutable receipt of one ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Record identifier.
    pub id: PingId,
    /// Owning monitor.
    pub monitor_id: MonitorId,
    /// Event kind.
    pub kind: PingKind,
    /// Server receipt time.
    pub received_at: DateTime<Utc>,
    /// Caller metadata.
    pub source: PingSource,
}
