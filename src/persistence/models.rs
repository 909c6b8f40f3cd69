//! Database row models and their conversion into domain records.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AlertChannel, AlertTargets, Archival, Incident, IncidentId, Monitor, MonitorId, MonitorStatus,
    Ping, PingId, PingKind, PingSource, Schedule, Slug,
};
use crate::error::WatchError;

/// Column list matching [`MonitorRow`].
pub const MONITOR_COLUMNS: &str = "id, name, slug, owner_id, interval_secs, grace_secs, status, \
     last_ping_at, last_started_at, next_expected_at, alert_email, alert_webhook_url, \
     archived_at, delete_after, created_at, updated_at";

/// Column list matching [`PingRow`].
pub const PING_COLUMNS: &str = "id, monitor_id, kind, received_at, source_ip, user_agent";

/// Column list matching [`IncidentRow`].
pub const INCIDENT_COLUMNS: &str = "id, monitor_id, started_at, resolved_at, notified";

/// A row from the `monitors` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MonitorRow {
    /// Primary key.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Unique ping slug.
    pub slug: String,
    /// Owning identity.
    pub owner_id: Option<String>,
    /// Expected interval in seconds.
    pub interval_secs: i32,
    /// Grace period in seconds.
    pub grace_secs: i32,
    /// Status storage name.
    pub status: String,
    /// Last heartbeat.
    pub last_ping_at: Option<DateTime<Utc>>,
    /// Last start.
    pub last_started_at: Option<DateTime<Utc>>,
    /// Deadline.
    pub next_expected_at: Option<DateTime<Utc>>,
    /// Alert email.
    pub alert_email: Option<String>,
    /// Alert webhook.
    pub alert_webhook_url: Option<String>,
    /// Archive time.
    pub archived_at: Option<DateTime<Utc>>,
    /// Purge time.
    pub delete_after: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<MonitorRow> for Monitor {
    type Error = WatchError;

    fn try_from(row: MonitorRow) -> Result<Self, Self::Error> {
        let interval = u32::try_from(row.interval_secs)
            .map_err(|_| corrupt("monitors.interval_secs", row.id))?;
        let grace =
            u32::try_from(row.grace_secs).map_err(|_| corrupt("monitors.grace_secs", row.id))?;
        let archival = match (row.archived_at, row.delete_after) {
            (Some(archived_at), Some(delete_after)) => Archival::Archived {
                archived_at,
                delete_after,
            },
            _ => Archival::Active,
        };

        Ok(Self {
            id: MonitorId::from_uuid(row.id),
            name: row.name,
            slug: Slug::new(row.slug).map_err(|_| corrupt("monitors.slug", row.id))?,
            owner_id: row.owner_id,
            schedule: Schedule::new(interval, grace)
                .map_err(|_| corrupt("monitors.schedule", row.id))?,
            status: row
                .status
                .parse::<MonitorStatus>()
                .map_err(|_| corrupt("monitors.status", row.id))?,
            last_ping_at: row.last_ping_at,
            last_started_at: row.last_started_at,
            next_expected_at: row.next_expected_at,
            alerts: AlertTargets {
                email: row.alert_email,
                webhook_url: row.alert_webhook_url,
            },
            archival,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `pings` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PingRow {
    /// Primary key.
    pub id: Uuid,
    /// Owning monitor.
    pub monitor_id: Uuid,
    /// Kind storage name.
    pub kind: String,
    /// Receipt time.
    pub received_at: DateTime<Utc>,
    /// Caller IP.
    pub source_ip: Option<String>,
    /// Caller user agent.
    pub user_agent: Option<String>,
}

impl TryFrom<PingRow> for Ping {
    type Error = WatchError;

    fn try_from(row: PingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: PingId::from_uuid(row.id),
            monitor_id: MonitorId::from_uuid(row.monitor_id),
            kind: PingKind::parse(&row.kind).ok_or_else(|| corrupt("pings.kind", row.id))?,
            received_at: row.received_at,
            source: PingSource {
                ip: row.source_ip,
                user_agent: row.user_agent,
            },
        })
    }
}

/// A row from the `incidents` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IncidentRow {
    /// Primary key.
    pub id: Uuid,
    /// Owning monitor.
    pub monitor_id: Uuid,
    /// Opening time.
    pub started_at: DateTime<Utc>,
    /// Resolution time.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Channel storage names.
    pub notified: Vec<String>,
}

impl From<IncidentRow> for Incident {
    fn from(row: IncidentRow) -> Self {
        Self {
            id: IncidentId::from_uuid(row.id),
            monitor_id: MonitorId::from_uuid(row.monitor_id),
            started_at: row.started_at,
            resolved_at: row.resolved_at,
            notified: row
                .notified
                .iter()
                .filter_map(|name| AlertChannel::parse(name))
                .collect(),
        }
    }
}

/// Storage names for a channel list.
#[must_use]
pub fn channel_names(channels: &[AlertChannel]) -> Vec<String> {
    channels.iter().map(|c| c.as_str().to_string()).collect()
}

fn corrupt(column: &str, id: Uuid) -> WatchError {
    WatchError::Internal(format!("corrupt value in {column} for row {id}"))
}
