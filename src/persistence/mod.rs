//! Persistence layer: monitor records with per-monitor atomic updates.
//!
//! [`MonitorStore`] is the seam between the services and storage. Every
//! state change goes through [`MonitorStore::apply`], which reads the
//! monitor and its open incident, runs the liveness planner, and writes the
//! resulting [`crate::domain::Plan`] in one atomic unit scoped to that
//! monitor. Two backends are provided: [`MemoryStore`] for single-instance
//! deployments and tests, and [`PostgresStore`] backed by `sqlx::PgPool`.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod rate_limit;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AlertChannel, Command, Incident, IncidentId, Monitor, MonitorId, MonitorStatus, Outcome, Ping,
    Plan, Slug,
};
use crate::error::WatchError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use rate_limit::{FixedWindow, MemoryRateLimiter, PostgresRateLimiter, RateDecision, RateLimiter};

/// Looks a monitor up by id or by ping slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorKey {
    /// Primary key.
    Id(MonitorId),
    /// Ping routing key.
    Slug(Slug),
}

impl MonitorKey {
    /// Error returned when nothing matches this key.
    #[must_use]
    pub fn not_found(&self) -> WatchError {
        match self {
            Self::Id(id) => WatchError::MonitorNotFound(id.to_string()),
            Self::Slug(slug) => WatchError::MonitorNotFound(slug.to_string()),
        }
    }
}

impl fmt::Display for MonitorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Slug(slug) => write!(f, "{slug}"),
        }
    }
}

/// Filter for [`MonitorStore::list`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorQuery {
    /// Only monitors in this status.
    pub status: Option<MonitorStatus>,
    /// Include soft-deleted monitors.
    pub include_archived: bool,
}

impl MonitorQuery {
    /// Returns `true` if `monitor` passes the filter.
    #[must_use]
    pub fn matches(&self, monitor: &Monitor) -> bool {
        (self.include_archived || !monitor.is_archived())
            && self.status.is_none_or(|status| monitor.status == status)
    }
}

/// The committed result of [`MonitorStore::apply`].
#[derive(Debug, Clone)]
pub struct Applied {
    /// Monitor state after the command.
    pub monitor: Monitor,
    /// Status before the command.
    pub previous_status: MonitorStatus,
    /// What the command did.
    pub outcome: Outcome,
    /// Ping appended by the command.
    pub ping: Option<Ping>,
    /// Incident opened by the command.
    pub opened_incident: Option<Incident>,
    /// Incident to alert under after a transition into DOWN.
    pub alert_incident: Option<Incident>,
    /// Incident resolved by the command.
    pub resolved_incident: Option<IncidentId>,
}

impl Applied {
    /// Builds the result from the state that was read and the plan that was
    /// written.
    #[must_use]
    pub fn from_plan(current: Monitor, plan: Plan) -> Self {
        Self {
            monitor: plan.monitor.unwrap_or(current),
            previous_status: plan.previous_status,
            outcome: plan.outcome,
            ping: plan.ping,
            opened_incident: plan.open_incident,
            alert_incident: plan.alert_incident,
            resolved_incident: plan.resolve_incident,
        }
    }

    /// Returns `true` when the status changed.
    #[must_use]
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.monitor.status
    }
}

/// Storage for monitors and their child pings and incidents.
///
/// Implementations must make [`apply`](Self::apply) atomic per monitor: the
/// read that feeds the planner and every write of the plan happen under one
/// lock or transaction, so a ping and a sweep racing on the same monitor
/// cannot lose updates or open two incidents.
#[async_trait]
pub trait MonitorStore: Send + Sync + fmt::Debug {
    /// Inserts a new monitor.
    ///
    /// # Errors
    ///
    /// [`WatchError::SlugTaken`] if the slug is already used.
    async fn insert(&self, monitor: &Monitor) -> Result<(), WatchError>;

    /// Loads one monitor.
    ///
    /// # Errors
    ///
    /// [`WatchError::MonitorNotFound`] if nothing matches.
    async fn get(&self, key: &MonitorKey) -> Result<Monitor, WatchError>;

    /// Lists monitors ordered by creation time.
    ///
    /// # Errors
    ///
    /// [`WatchError::PersistenceError`] on storage failure.
    async fn list(&self, query: &MonitorQuery) -> Result<Vec<Monitor>, WatchError>;

    /// Plans `command` against the monitor's current state and commits the
    /// plan atomically.
    ///
    /// # Errors
    ///
    /// [`WatchError::MonitorNotFound`] if nothing matches, planner errors,
    /// or [`WatchError::PersistenceError`] on storage failure.
    async fn apply(
        &self,
        key: &MonitorKey,
        command: &Command,
        now: DateTime<Utc>,
    ) -> Result<Applied, WatchError>;

    /// Ids of live monitors in a sweepable status whose deadline is at or
    /// before `now`, earliest deadline first.
    ///
    /// # Errors
    ///
    /// [`WatchError::PersistenceError`] on storage failure.
    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<MonitorId>, WatchError>;

    /// Most recent pings of a monitor, newest first.
    ///
    /// # Errors
    ///
    /// [`WatchError::MonitorNotFound`] if the monitor does not exist.
    async fn pings(&self, id: MonitorId, limit: usize) -> Result<Vec<Ping>, WatchError>;

    /// Most recent incidents of a monitor, newest first.
    ///
    /// # Errors
    ///
    /// [`WatchError::MonitorNotFound`] if the monitor does not exist.
    async fn incidents(&self, id: MonitorId, limit: usize) -> Result<Vec<Incident>, WatchError>;

    /// Adds the alert channels that accepted an alert for the incident.
    /// Channels already recorded are kept once.
    ///
    /// # Errors
    ///
    /// [`WatchError::IncidentNotFound`] if the incident does not exist.
    async fn record_notified(
        &self,
        incident_id: IncidentId,
        channels: &[AlertChannel],
    ) -> Result<(), WatchError>;

    /// Resolves an open incident by hand.
    ///
    /// # Errors
    ///
    /// [`WatchError::IncidentNotFound`] if the incident does not belong to
    /// the monitor, [`WatchError::InvalidState`] if it is already resolved.
    async fn resolve_incident(
        &self,
        monitor_id: MonitorId,
        incident_id: IncidentId,
        at: DateTime<Utc>,
    ) -> Result<Incident, WatchError>;

    /// Deletes archived monitors whose retention window ended, children
    /// first. Returns the purged ids.
    ///
    /// # Errors
    ///
    /// [`WatchError::PersistenceError`] if the candidate query fails.
    /// Failures on individual monitors are logged and skipped.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<MonitorId>, WatchError>;
}
