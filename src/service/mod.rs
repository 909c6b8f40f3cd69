//! Service layer: business logic orchestration.
//!
//! [`PingIngestor`] handles inbound heartbeats, [`LivenessSweeper`] detects
//! overdue monitors and raises incidents, and [`MonitorService`] covers
//! monitor management. All three commit through
//! [`crate::persistence::MonitorStore::apply`] and then emit events through
//! the [`crate::domain::EventBus`].

pub mod ingestor;
pub mod monitor_service;
pub mod sweeper;

use chrono::{DateTime, Utc};

use crate::domain::{EventBus, MonitorEvent};
use crate::persistence::Applied;

pub use ingestor::{PingIngestor, PingResult};
pub use monitor_service::MonitorService;
pub use sweeper::{LivenessSweeper, SweepReport};

/// Publishes the events implied by a committed command.
pub(crate) fn publish_applied(bus: &EventBus, applied: &Applied, timestamp: DateTime<Utc>) {
    bus.publish_all(applied_events(applied, timestamp));
}

fn applied_events(applied: &Applied, timestamp: DateTime<Utc>) -> Vec<MonitorEvent> {
    let monitor_id = applied.monitor.id;
    let mut events = Vec::new();
    if let Some(ping) = &applied.ping {
        events.push(MonitorEvent::PingReceived {
            monitor_id,
            kind: ping.kind,
            next_expected_at: applied.monitor.next_expected_at,
            timestamp: ping.received_at,
        });
    }
    if applied.status_changed() {
        events.push(MonitorEvent::StatusChanged {
            monitor_id,
            from: applied.previous_status,
            to: applied.monitor.status,
            timestamp,
        });
    }
    if let Some(incident) = &applied.opened_incident {
        events.push(MonitorEvent::IncidentOpened {
            monitor_id,
            incident_id: incident.id,
            timestamp: incident.started_at,
        });
    }
    if let Some(incident_id) = applied.resolved_incident {
        events.push(MonitorEvent::IncidentResolved {
            monitor_id,
            incident_id,
            timestamp,
        });
    }
    events
}
