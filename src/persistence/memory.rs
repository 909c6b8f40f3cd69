//! In-process monitor storage with per-monitor locking.
//!
//! [`MemoryStore`] keeps every monitor, together with its pings and
//! incidents, in one record behind its own [`tokio::sync::Mutex`]. The outer
//! maps are only held long enough to find a record, so commands on different
//! monitors run concurrently while commands on the same monitor serialize.
//! Valid for a single instance; state is lost on restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::{Applied, MonitorKey, MonitorQuery, MonitorStore};
use crate::domain::{
    AlertChannel, Command, Incident, IncidentId, Monitor, MonitorId, Ping, Slug, liveness,
};
use crate::error::WatchError;

/// A monitor and its children, locked as one unit.
#[derive(Debug)]
struct MonitorRecord {
    monitor: Monitor,
    pings: Vec<Ping>,
    incidents: Vec<Incident>,
    removed: bool,
}

impl MonitorRecord {
    fn open_incident(&self) -> Option<&Incident> {
        self.incidents.iter().rev().find(|i| i.is_open())
    }
}

#[derive(Debug, Default)]
struct Index {
    by_id: HashMap<MonitorId, Arc<Mutex<MonitorRecord>>>,
    by_slug: HashMap<Slug, MonitorId>,
    incident_owner: HashMap<IncidentId, MonitorId>,
}

/// Monitor store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    index: RwLock<Index>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, key: &MonitorKey) -> Result<Arc<Mutex<MonitorRecord>>, WatchError> {
        let index = self.index.read().await;
        let id = match key {
            MonitorKey::Id(id) => Some(*id),
            MonitorKey::Slug(slug) => index.by_slug.get(slug).copied(),
        };
        id.and_then(|id| index.by_id.get(&id).cloned())
            .ok_or_else(|| key.not_found())
    }

    /// Returns the number of stored monitors, archived included.
    pub async fn len(&self) -> usize {
        self.index.read().await.by_id.len()
    }

    /// Returns `true` if the store holds no monitors.
    pub async fn is_empty(&self) -> bool {
        self.index.read().await.by_id.is_empty()
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn insert(&self, monitor: &Monitor) -> Result<(), WatchError> {
        let mut index = self.index.write().await;
        if index.by_slug.contains_key(&monitor.slug) {
            return Err(WatchError::SlugTaken(monitor.slug.to_string()));
        }
        if index.by_id.contains_key(&monitor.id) {
            return Err(WatchError::InvalidRequest(format!(
                "monitor {} already exists",
                monitor.id
            )));
        }
        index.by_slug.insert(monitor.slug.clone(), monitor.id);
        index.by_id.insert(
            monitor.id,
            Arc::new(Mutex::new(MonitorRecord {
                monitor: monitor.clone(),
                pings: Vec::new(),
                incidents: Vec::new(),
                removed: false,
            })),
        );
        Ok(())
    }

    async fn get(&self, key: &MonitorKey) -> Result<Monitor, WatchError> {
        let record = self.record(key).await?;
        let record = record.lock().await;
        if record.removed {
            return Err(key.not_found());
        }
        Ok(record.monitor.clone())
    }

    async fn list(&self, query: &MonitorQuery) -> Result<Vec<Monitor>, WatchError> {
        let records: Vec<_> = self.index.read().await.by_id.values().cloned().collect();
        let mut monitors = Vec::with_capacity(records.len());
        for record in records {
            let record = record.lock().await;
            if !record.removed && query.matches(&record.monitor) {
                monitors.push(record.monitor.clone());
            }
        }
        monitors.sort_by_key(|m| (m.created_at, m.id));
        Ok(monitors)
    }

    async fn apply(
        &self,
        key: &MonitorKey,
        command: &Command,
        now: DateTime<Utc>,
    ) -> Result<Applied, WatchError> {
        let record = self.record(key).await?;
        let mut record = record.lock().await;
        if record.removed {
            return Err(key.not_found());
        }

        let plan = liveness::plan(&record.monitor, record.open_incident(), command, now)?;
        let current = record.monitor.clone();
        if plan.is_noop() {
            return Ok(Applied::from_plan(current, plan));
        }

        if let Some(next) = &plan.monitor {
            record.monitor = next.clone();
        }
        if let Some(ping) = &plan.ping {
            record.pings.push(ping.clone());
        }
        if let Some(incident_id) = plan.resolve_incident
            && let Some(incident) = record.incidents.iter_mut().find(|i| i.id == incident_id)
        {
            incident.resolved_at = Some(now);
        }
        if let Some(incident) = &plan.open_incident {
            record.incidents.push(incident.clone());
            drop(record);
            self.index
                .write()
                .await
                .incident_owner
                .insert(incident.id, incident.monitor_id);
        }

        Ok(Applied::from_plan(current, plan))
    }

    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<MonitorId>, WatchError> {
        let records: Vec<_> = self.index.read().await.by_id.values().cloned().collect();
        let mut due = Vec::new();
        for record in records {
            let record = record.lock().await;
            if !record.removed
                && record.monitor.is_sweep_candidate(now)
                && let Some(deadline) = record.monitor.next_expected_at
            {
                due.push((deadline, record.monitor.id));
            }
        }
        due.sort();
        Ok(due.into_iter().map(|(_, id)| id).collect())
    }

    async fn pings(&self, id: MonitorId, limit: usize) -> Result<Vec<Ping>, WatchError> {
        let record = self.record(&MonitorKey::Id(id)).await?;
        let record = record.lock().await;
        Ok(record.pings.iter().rev().take(limit).cloned().collect())
    }

    async fn incidents(&self, id: MonitorId, limit: usize) -> Result<Vec<Incident>, WatchError> {
        let record = self.record(&MonitorKey::Id(id)).await?;
        let record = record.lock().await;
        Ok(record.incidents.iter().rev().take(limit).cloned().collect())
    }

    async fn record_notified(
        &self,
        incident_id: IncidentId,
        channels: &[AlertChannel],
    ) -> Result<(), WatchError> {
        let owner = self
            .index
            .read()
            .await
            .incident_owner
            .get(&incident_id)
            .copied()
            .ok_or(WatchError::IncidentNotFound(*incident_id.as_uuid()))?;
        let record = self.record(&MonitorKey::Id(owner)).await?;
        let mut record = record.lock().await;
        let incident = record
            .incidents
            .iter_mut()
            .find(|i| i.id == incident_id)
            .ok_or(WatchError::IncidentNotFound(*incident_id.as_uuid()))?;
        for channel in channels {
            if !incident.notified.contains(channel) {
                incident.notified.push(*channel);
            }
        }
        Ok(())
    }

    async fn resolve_incident(
        &self,
        monitor_id: MonitorId,
        incident_id: IncidentId,
        at: DateTime<Utc>,
    ) -> Result<Incident, WatchError> {
        let record = self.record(&MonitorKey::Id(monitor_id)).await?;
        let mut record = record.lock().await;
        let incident = record
            .incidents
            .iter_mut()
            .find(|i| i.id == incident_id)
            .ok_or(WatchError::IncidentNotFound(*incident_id.as_uuid()))?;
        if !incident.is_open() {
            return Err(WatchError::InvalidState(format!(
                "incident {incident_id} is already resolved"
            )));
        }
        incident.resolved_at = Some(at);
        Ok(incident.clone())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<MonitorId>, WatchError> {
        let mut index = self.index.write().await;
        let mut purged = Vec::new();
        for (id, record) in &index.by_id {
            let mut record = record.lock().await;
            if record.monitor.is_purgeable(now) {
                record.pings.clear();
                record.incidents.clear();
                record.removed = true;
                purged.push((*id, record.monitor.slug.clone()));
            }
        }
        for (id, slug) in &purged {
            index.by_id.remove(id);
            index.by_slug.remove(slug);
        }
        let ids: Vec<MonitorId> = purged.into_iter().map(|(id, _)| id).collect();
        index.incident_owner.retain(|_, owner| !ids.contains(owner));
        Ok(ids)
    }
}
