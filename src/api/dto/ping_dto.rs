//! Ping endpoint response body.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::service::PingResult;

/// Response of `/ping/{slug}` and `/ping/{slug}/start`.
///
/// Serializes as `{"status":"ok","next":...}`, `{"status":"paused"}` or
/// `{"status":"running","startedAt":...}`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PingResponse {
    /// Heartbeat recorded.
    Ok {
        /// Next deadline (ISO-8601).
        next: DateTime<Utc>,
    },
    /// Monitor is paused; ping ignored.
    Paused,
    /// Start recorded.
    Running {
        /// Recorded start time (ISO-8601).
        #[serde(rename = "startedAt")]
        started_at: DateTime<Utc>,
    },
}

impl From<PingResult> for PingResponse {
    fn from(result: PingResult) -> Self {
        match result {
            PingResult::Ok { next } => Self::Ok { next },
            PingResult::Paused => Self::Paused,
            PingResult::Running { started_at } => Self::Running { started_at },
        }
    }
}
