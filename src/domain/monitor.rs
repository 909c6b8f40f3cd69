//! Monitor records: schedule, runtime status, alert targets and archival.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{MonitorId, Slug};
use crate::error::WatchError;

/// Smallest accepted expected interval (one minute).
pub const MIN_INTERVAL_SECS: u32 = 60;
/// Largest accepted expected interval (one week).
pub const MAX_INTERVAL_SECS: u32 = 604_800;
/// Largest accepted grace period (one hour).
pub const MAX_GRACE_SECS: u32 = 3_600;

const MAX_NAME_LENGTH: usize = 100;

/// Runtime liveness status of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    /// Created, no ping or start received yet. No deadline.
    Pending,
    /// A `start` event arrived; the job is running.
    Running,
    /// Last heartbeat arrived before its deadline.
    Healthy,
    /// Deadline passed, still inside the grace period.
    Late,
    /// Deadline and grace period both passed. An incident is open.
    Down,
    /// Frozen by the user. Pings are acknowledged and ignored.
    Paused,
}

impl MonitorStatus {
    /// Statuses the liveness sweeper examines.
    pub const SWEEPABLE: [Self; 3] = [Self::Healthy, Self::Late, Self::Running];

    /// Returns the lowercase wire/storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Healthy => "healthy",
            Self::Late => "late",
            Self::Down => "down",
            Self::Paused => "paused",
        }
    }

    /// Returns `true` when a passed deadline can move this status.
    #[must_use]
    pub fn is_sweepable(&self) -> bool {
        Self::SWEEPABLE.contains(self)
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorStatus {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "healthy" => Ok(Self::Healthy),
            "late" => Ok(Self::Late),
            "down" => Ok(Self::Down),
            "paused" => Ok(Self::Paused),
            other => Err(WatchError::InvalidRequest(format!(
                "unknown monitor status: {other}"
            ))),
        }
    }
}

/// Expected heartbeat cadence. Bounds are checked on construction, so a
/// `Schedule` held by a monitor is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    interval_secs: u32,
    grace_secs: u32,
}

impl Schedule {
    /// Builds a schedule after checking both bounds.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidRequest`] if the interval is outside
    /// `[60, 604800]` or the grace period is above 3600 seconds.
    pub fn new(interval_secs: u32, grace_secs: u32) -> Result<Self, WatchError> {
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&interval_secs) {
            return Err(WatchError::InvalidRequest(format!(
                "interval_secs must be between {MIN_INTERVAL_SECS} and {MAX_INTERVAL_SECS}, got {interval_secs}"
            )));
        }
        if grace_secs > MAX_GRACE_SECS {
            return Err(WatchError::InvalidRequest(format!(
                "grace_secs must be between 0 and {MAX_GRACE_SECS}, got {grace_secs}"
            )));
        }
        Ok(Self {
            interval_secs,
            grace_secs,
        })
    }

    /// Expected interval in seconds.
    #[must_use]
    pub const fn interval_secs(&self) -> u32 {
        self.interval_secs
    }

    /// Grace period in seconds.
    #[must_use]
    pub const fn grace_secs(&self) -> u32 {
        self.grace_secs
    }

    /// Expected interval as a duration.
    #[must_use]
    pub fn interval(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.interval_secs))
    }

    /// Grace period as a duration.
    #[must_use]
    pub fn grace(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.grace_secs))
    }
}

/// Where alerts for a monitor go. Both targets are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTargets {
    /// Alert email address.
    pub email: Option<String>,
    /// Alert webhook (Slack incoming webhooks included).
    pub webhook_url: Option<String>,
}

impl AlertTargets {
    /// Validates and builds alert targets. Blank strings count as absent.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidRequest`] for a malformed email or a
    /// webhook URL that is not absolute `http`/`https`.
    pub fn new(email: Option<String>, webhook_url: Option<String>) -> Result<Self, WatchError> {
        let email = normalize(email);
        let webhook_url = normalize(webhook_url);
        if let Some(email) = &email {
            validate_email(email)?;
        }
        if let Some(url) = &webhook_url {
            validate_webhook_url(url)?;
        }
        Ok(Self { email, webhook_url })
    }

    /// Returns `true` when no target is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.webhook_url.is_none()
    }
}

/// Soft-delete state. Archived monitors are kept until `delete_after`,
/// then purged together with their pings and incidents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Archival {
    /// Live monitor.
    #[default]
    Active,
    /// Soft-deleted monitor awaiting purge.
    Archived {
        /// When the monitor was archived.
        archived_at: DateTime<Utc>,
        /// When the retention window ends.
        delete_after: DateTime<Utc>,
    },
}

/// One expected recurring job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    /// Stable identifier.
    pub id: MonitorId,
    /// Human-readable name.
    pub name: String,
    /// Ping routing key, immutable after creation.
    pub slug: Slug,
    /// Owning identity, for display only.
    pub owner_id: Option<String>,
    /// Expected interval and grace period.
    pub schedule: Schedule,
    /// Current liveness status.
    pub status: MonitorStatus,
    /// Receipt time of the last heartbeat.
    pub last_ping_at: Option<DateTime<Utc>>,
    /// Receipt time of the last `start` event.
    pub last_started_at: Option<DateTime<Utc>>,
    /// Deadline for the next heartbeat. `None` only while pending.
    pub next_expected_at: Option<DateTime<Utc>>,
    /// Alert destinations.
    pub alerts: AlertTargets,
    /// Soft-delete state.
    pub archival: Archival,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    /// Validates a creation request and builds a pending monitor.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidRequest`] when any field breaks its
    /// bounds or format.
    pub fn create(spec: NewMonitor, now: DateTime<Utc>) -> Result<Self, WatchError> {
        let name = validate_name(&spec.name)?;
        let schedule = Schedule::new(spec.interval_secs, spec.grace_secs)?;
        let slug = match spec.slug {
            Some(raw) => Slug::new(raw)?,
            None => Slug::generate(),
        };
        let alerts = AlertTargets::new(spec.alert_email, spec.alert_webhook_url)?;

        Ok(Self {
            id: MonitorId::new(),
            name,
            slug,
            owner_id: normalize(spec.owner_id),
            schedule,
            status: MonitorStatus::Pending,
            last_ping_at: None,
            last_started_at: None,
            next_expected_at: None,
            alerts,
            archival: Archival::Active,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns `true` once the monitor has been soft-deleted.
    #[must_use]
    pub const fn is_archived(&self) -> bool {
        matches!(self.archival, Archival::Archived { .. })
    }

    /// Deadline plus grace period, if a deadline exists.
    #[must_use]
    pub fn grace_end(&self) -> Option<DateTime<Utc>> {
        self.next_expected_at
            .map(|deadline| deadline + self.schedule.grace())
    }

    /// Returns `true` when the sweeper should look at this monitor at `now`.
    #[must_use]
    pub fn is_sweep_candidate(&self, now: DateTime<Utc>) -> bool {
        !self.is_archived()
            && self.status.is_sweepable()
            && self.next_expected_at.is_some_and(|deadline| deadline <= now)
    }

    /// Returns `true` when the archive retention window has elapsed.
    #[must_use]
    pub fn is_purgeable(&self, now: DateTime<Utc>) -> bool {
        matches!(self.archival, Archival::Archived { delete_after, .. } if delete_after <= now)
    }
}

/// Validated input for monitor creation.
#[derive(Debug, Clone, Default)]
pub struct NewMonitor {
    /// Human-readable name.
    pub name: String,
    /// Requested slug; a random one is generated when absent.
    pub slug: Option<String>,
    /// Expected interval in seconds.
    pub interval_secs: u32,
    /// Grace period in seconds.
    pub grace_secs: u32,
    /// Owning identity.
    pub owner_id: Option<String>,
    /// Alert email.
    pub alert_email: Option<String>,
    /// Alert webhook URL.
    pub alert_webhook_url: Option<String>,
}

/// Partial settings update. `None` leaves a field unchanged; for alert
/// targets `Some(None)` clears the target.
#[derive(Debug, Clone, Default)]
pub struct MonitorPatch {
    /// New name.
    pub name: Option<String>,
    /// New expected interval.
    pub interval_secs: Option<u32>,
    /// New grace period.
    pub grace_secs: Option<u32>,
    /// New alert email, or `Some(None)` to clear.
    pub alert_email: Option<Option<String>>,
    /// New alert webhook, or `Some(None)` to clear.
    pub alert_webhook_url: Option<Option<String>>,
}

impl MonitorPatch {
    /// Returns a copy of `monitor` with the patch applied and validated.
    ///
    /// A changed interval re-derives the deadline from the last heartbeat.
    /// A LATE monitor whose new deadline is still ahead goes back to HEALTHY.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidRequest`] if the patched values break
    /// validation.
    pub fn apply_to(&self, monitor: &Monitor, now: DateTime<Utc>) -> Result<Monitor, WatchError> {
        let mut next = monitor.clone();
        if let Some(name) = &self.name {
            next.name = validate_name(name)?;
        }
        let interval = self
            .interval_secs
            .unwrap_or(monitor.schedule.interval_secs());
        let grace = self.grace_secs.unwrap_or(monitor.schedule.grace_secs());
        next.schedule = Schedule::new(interval, grace)?;

        let email = match &self.alert_email {
            Some(value) => value.clone(),
            None => monitor.alerts.email.clone(),
        };
        let webhook = match &self.alert_webhook_url {
            Some(value) => value.clone(),
            None => monitor.alerts.webhook_url.clone(),
        };
        next.alerts = AlertTargets::new(email, webhook)?;

        if next.schedule.interval_secs() != monitor.schedule.interval_secs()
            && let Some(last_ping) = monitor.last_ping_at
            && monitor.next_expected_at.is_some()
        {
            let deadline = last_ping + next.schedule.interval();
            next.next_expected_at = Some(deadline);
            if next.status == MonitorStatus::Late && deadline > now {
                next.status = MonitorStatus::Healthy;
            }
        }
        next.updated_at = now;
        Ok(next)
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_name(name: &str) -> Result<String, WatchError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(WatchError::InvalidRequest("name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(WatchError::InvalidRequest(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_email(email: &str) -> Result<(), WatchError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        });
    if valid {
        Ok(())
    } else {
        Err(WatchError::InvalidRequest(format!("invalid alert email: {email}")))
    }
}

fn validate_webhook_url(url: &str) -> Result<(), WatchError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| WatchError::InvalidRequest(format!("invalid webhook url: {e}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(()),
        _ => Err(WatchError::InvalidRequest(
            "webhook url must be an absolute http(s) url".to_string(),
        )),
    }
}
