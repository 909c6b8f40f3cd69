//! Monitor management: create, reconfigure, pause/resume, archive/restore,
//! history and manual incident resolution.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};

use super::publish_applied;
use crate::domain::{
    Command, EventBus, Incident, IncidentId, Monitor, MonitorEvent, MonitorId, MonitorPatch,
    NewMonitor, Ping,
};
use crate::error::WatchError;
use crate::persistence::{Applied, MonitorKey, MonitorQuery, MonitorStore};

/// Orchestration layer for user-facing monitor operations.
///
/// Every state change goes through [`MonitorStore::apply`] so it serialises
/// with concurrent pings and sweeps on the same monitor.
#[derive(Debug, Clone)]
pub struct MonitorService {
    store: Arc<dyn MonitorStore>,
    event_bus: EventBus,
    archive_retention: TimeDelta,
}

impl MonitorService {
    /// Creates a new `MonitorService`.
    #[must_use]
    pub fn new(store: Arc<dyn MonitorStore>, event_bus: EventBus, archive_retention: TimeDelta) -> Self {
        Self {
            store,
            event_bus,
            archive_retention,
        }
    }

    /// Validates and stores a new pending monitor.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidRequest`] on validation failure or
    /// [`WatchError::SlugTaken`] if the slug is in use.
    pub async fn create(&self, spec: NewMonitor) -> Result<Monitor, WatchError> {
        let monitor = Monitor::create(spec, Utc::now())?;
        self.store.insert(&monitor).await?;
        tracing::info!(
            monitor_id = %monitor.id,
            slug = %monitor.slug,
            interval_secs = monitor.schedule.interval_secs(),
            grace_secs = monitor.schedule.grace_secs(),
            "monitor created"
        );
        Ok(monitor)
    }

    /// Loads one monitor, archived or not.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::MonitorNotFound`] if it does not exist.
    pub async fn get(&self, id: MonitorId) -> Result<Monitor, WatchError> {
        self.store.get(&MonitorKey::Id(id)).await
    }

    /// Lists monitors matching `query`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PersistenceError`] on storage failure.
    pub async fn list(&self, query: &MonitorQuery) -> Result<Vec<Monitor>, WatchError> {
        self.store.list(query).await
    }

    /// Applies a settings patch.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidRequest`] if the result is invalid,
    /// [`WatchError::InvalidState`] for archived monitors.
    pub async fn reconfigure(&self, id: MonitorId, patch: MonitorPatch) -> Result<Monitor, WatchError> {
        let applied = self.command(id, Command::Reconfigure(patch)).await?;
        tracing::info!(monitor_id = %id, "monitor reconfigured");
        Ok(applied.monitor)
    }

    /// Freezes the monitor. Pausing a paused monitor is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidState`] for archived monitors.
    pub async fn pause(&self, id: MonitorId) -> Result<Monitor, WatchError> {
        let applied = self.command(id, Command::Pause).await?;
        if applied.status_changed() {
            tracing::info!(monitor_id = %id, "monitor paused");
        }
        Ok(applied.monitor)
    }

    /// Unfreezes the monitor into PENDING; the next ping re-arms it.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidState`] if the monitor is not paused.
    pub async fn resume(&self, id: MonitorId) -> Result<Monitor, WatchError> {
        let applied = self.command(id, Command::Resume).await?;
        tracing::info!(monitor_id = %id, "monitor resumed");
        Ok(applied.monitor)
    }

    /// Soft-deletes the monitor for the configured retention window.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidState`] if it is already archived.
    pub async fn archive(&self, id: MonitorId) -> Result<Monitor, WatchError> {
        let retention = self.archive_retention;
        let applied = self.command(id, Command::Archive { retention }).await?;
        tracing::info!(monitor_id = %id, retention_days = retention.num_days(), "monitor archived");
        Ok(applied.monitor)
    }

    /// Restores an archived monitor before it is purged.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidState`] if it is not archived.
    pub async fn restore(&self, id: MonitorId) -> Result<Monitor, WatchError> {
        let applied = self.command(id, Command::Restore).await?;
        tracing::info!(monitor_id = %id, "monitor restored");
        Ok(applied.monitor)
    }

    /// Most recent pings, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::MonitorNotFound`] if the monitor does not exist.
    pub async fn pings(&self, id: MonitorId, limit: usize) -> Result<Vec<Ping>, WatchError> {
        self.store.pings(id, limit).await
    }

    /// Most recent incidents, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::MonitorNotFound`] if the monitor does not exist.
    pub async fn incidents(&self, id: MonitorId, limit: usize) -> Result<Vec<Incident>, WatchError> {
        self.store.incidents(id, limit).await
    }

    /// Resolves an open incident by hand.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::IncidentNotFound`] or
    /// [`WatchError::InvalidState`] if it is already resolved.
    pub async fn resolve_incident(
        &self,
        monitor_id: MonitorId,
        incident_id: IncidentId,
    ) -> Result<Incident, WatchError> {
        let now = Utc::now();
        let incident = self
            .store
            .resolve_incident(monitor_id, incident_id, now)
            .await?;
        let _ = self.event_bus.publish(MonitorEvent::IncidentResolved {
            monitor_id,
            incident_id,
            timestamp: now,
        });
        tracing::info!(%monitor_id, %incident_id, "incident resolved manually");
        Ok(incident)
    }

    async fn command(&self, id: MonitorId, command: Command) -> Result<Applied, WatchError> {
        let now = Utc::now();
        let applied = self.store.apply(&MonitorKey::Id(id), &command, now).await?;
        publish_applied(&self.event_bus, &applied, now);
        Ok(applied)
    }
}
