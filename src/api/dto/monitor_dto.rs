//! Monitor DTOs for create, update, get, list and history operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::common_dto::{PaginationMeta, deserialize_optional_nullable};
use crate::domain::{
    AlertChannel, Archival, Incident, IncidentId, Monitor, MonitorId, MonitorPatch, MonitorStatus,
    NewMonitor, Ping, PingId, PingKind,
};

/// Request body for `POST /monitors`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMonitorRequest {
    /// Human-readable name (1-100 chars).
    pub name: String,
    /// Ping slug; a random one is generated when omitted.
    #[serde(default)]
    pub slug: Option<String>,
    /// Expected interval in seconds (60-604800).
    pub interval_secs: u32,
    /// Grace period in seconds (0-3600). Defaults to 0.
    #[serde(default)]
    pub grace_secs: u32,
    /// Owning identity, for display.
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Alert email address.
    #[serde(default)]
    pub alert_email: Option<String>,
    /// Alert webhook URL (Slack incoming webhooks included).
    #[serde(default)]
    pub alert_webhook_url: Option<String>,
}

impl From<CreateMonitorRequest> for NewMonitor {
    fn from(req: CreateMonitorRequest) -> Self {
        Self {
            name: req.name,
            slug: req.slug,
            interval_secs: req.interval_secs,
            grace_secs: req.grace_secs,
            owner_id: req.owner_id,
            alert_email: req.alert_email,
            alert_webhook_url: req.alert_webhook_url,
        }
    }
}

/// Request body for `PATCH /monitors/{id}`. Absent fields are unchanged;
/// `null` clears an alert target.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateMonitorRequest {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New expected interval in seconds.
    #[serde(default)]
    pub interval_secs: Option<u32>,
    /// New grace period in seconds.
    #[serde(default)]
    pub grace_secs: Option<u32>,
    /// New alert email, or `null` to clear.
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    #[schema(value_type = Option<String>)]
    pub alert_email: Option<Option<String>>,
    /// New alert webhook URL, or `null` to clear.
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    #[schema(value_type = Option<String>)]
    pub alert_webhook_url: Option<Option<String>>,
}

impl From<UpdateMonitorRequest> for MonitorPatch {
    fn from(req: UpdateMonitorRequest) -> Self {
        Self {
            name: req.name,
            interval_secs: req.interval_secs,
            grace_secs: req.grace_secs,
            alert_email: req.alert_email,
            alert_webhook_url: req.alert_webhook_url,
        }
    }
}

/// Full monitor representation.
#[derive(Debug, Serialize, ToSchema)]
pub struct MonitorDto {
    /// Monitor identifier.
    #[schema(value_type = uuid::Uuid)]
    pub id: MonitorId,
    /// Human-readable name.
    pub name: String,
    /// Ping slug.
    pub slug: String,
    /// Path to ping for a heartbeat.
    pub ping_path: String,
    /// Owning identity.
    pub owner_id: Option<String>,
    /// Expected interval in seconds.
    pub interval_secs: u32,
    /// Grace period in seconds.
    pub grace_secs: u32,
    /// Liveness status.
    pub status: MonitorStatus,
    /// Last heartbeat receipt.
    pub last_ping_at: Option<DateTime<Utc>>,
    /// Last start receipt.
    pub last_started_at: Option<DateTime<Utc>>,
    /// Next heartbeat deadline.
    pub next_expected_at: Option<DateTime<Utc>>,
    /// Alert email.
    pub alert_email: Option<String>,
    /// Alert webhook URL.
    pub alert_webhook_url: Option<String>,
    /// Soft-deleted flag.
    pub archived: bool,
    /// When it was archived.
    pub archived_at: Option<DateTime<Utc>>,
    /// When it will be purged.
    pub delete_after: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl From<Monitor> for MonitorDto {
    fn from(m: Monitor) -> Self {
        let (archived_at, delete_after) = match m.archival {
            Archival::Active => (None, None),
            Archival::Archived {
                archived_at,
                delete_after,
            } => (Some(archived_at), Some(delete_after)),
        };
        Self {
            id: m.id,
            ping_path: format!("/ping/{}", m.slug),
            slug: m.slug.to_string(),
            name: m.name,
            owner_id: m.owner_id,
            interval_secs: m.schedule.interval_secs(),
            grace_secs: m.schedule.grace_secs(),
            status: m.status,
            last_ping_at: m.last_ping_at,
            last_started_at: m.last_started_at,
            next_expected_at: m.next_expected_at,
            alert_email: m.alerts.email,
            alert_webhook_url: m.alerts.webhook_url,
            archived: archived_at.is_some(),
            archived_at,
            delete_after,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// Query parameters for `GET /monitors`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListMonitorsParams {
    /// Page number (1-indexed).
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (max 100).
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// Only monitors in this status.
    #[serde(default)]
    pub status: Option<MonitorStatus>,
    /// Include archived monitors.
    #[serde(default)]
    pub include_archived: bool,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

/// Paginated list response for `GET /monitors`.
#[derive(Debug, Serialize, ToSchema)]
pub struct MonitorListResponse {
    /// Monitors on this page.
    pub data: Vec<MonitorDto>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// One recorded ping.
#[derive(Debug, Serialize, ToSchema)]
pub struct PingDto {
    /// Ping identifier.
    #[schema(value_type = uuid::Uuid)]
    pub id: PingId,
    /// Signal kind.
    pub kind: PingKind,
    /// Server receipt time.
    pub received_at: DateTime<Utc>,
    /// Caller IP.
    pub ip: Option<String>,
    /// Caller user agent.
    pub user_agent: Option<String>,
}

impl From<Ping> for PingDto {
    fn from(p: Ping) -> Self {
        Self {
            id: p.id,
            kind: p.kind,
            received_at: p.received_at,
            ip: p.source.ip,
            user_agent: p.source.user_agent,
        }
    }
}

/// One recorded down period.
#[derive(Debug, Serialize, ToSchema)]
pub struct IncidentDto {
    /// Incident identifier.
    #[schema(value_type = uuid::Uuid)]
    pub id: IncidentId,
    /// Owning monitor.
    #[schema(value_type = uuid::Uuid)]
    pub monitor_id: MonitorId,
    /// When the monitor went down.
    pub started_at: DateTime<Utc>,
    /// When the incident was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// `true` while unresolved.
    pub open: bool,
    /// Channels that accepted the down alert.
    pub notified: Vec<AlertChannel>,
}

impl From<Incident> for IncidentDto {
    fn from(i: Incident) -> Self {
        Self {
            open: i.is_open(),
            id: i.id,
            monitor_id: i.monitor_id,
            started_at: i.started_at,
            resolved_at: i.resolved_at,
            notified: i.notified,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn update_request_distinguishes_absent_and_null() {
        let Ok(req) = serde_json::from_str::<UpdateMonitorRequest>(
            r#"{"alert_email": null, "name": "x"}"#,
        ) else {
            panic!("valid body rejected");
        };
        assert_eq!(req.alert_email, Some(None));
        assert_eq!(req.alert_webhook_url, None);
        assert_eq!(req.name.as_deref(), Some("x"));
    }

    #[test]
    fn monitor_dto_exposes_ping_path() {
        let spec = NewMonitor {
            name: "n".to_string(),
            slug: Some("my-job".to_string()),
            interval_secs: 60,
            ..NewMonitor::default()
        };
        let Ok(monitor) = Monitor::create(spec, Utc::now()) else {
            panic!("valid monitor rejected");
        };
        let dto = MonitorDto::from(monitor);
        assert_eq!(dto.ping_path, "/ping/my-job");
        assert!(!dto.archived);
        assert_eq!(dto.status, MonitorStatus::Pending);
    }
}
