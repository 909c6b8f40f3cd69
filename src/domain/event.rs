//! Domain events reflecting monitor state changes.
//!
//! Services publish a [`MonitorEvent`] through the [`super::EventBus`] after
//! each committed mutation. Events are forwarded to WebSocket subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{IncidentId, MonitorId, MonitorStatus, PingKind};

/// Domain event emitted after a committed mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A ping was recorded.
    PingReceived {
        /// Monitor identifier.
        monitor_id: MonitorId,
        /// Ping kind.
        kind: PingKind,
        /// Deadline after the ping.
        next_expected_at: Option<DateTime<Utc>>,
        /// Receipt time.
        timestamp: DateTime<Utc>,
    },

    /// The monitor's status changed.
    StatusChanged {
        /// Monitor identifier.
        monitor_id: MonitorId,
        /// Status before.
        from: MonitorStatus,
        /// Status after.
        to: MonitorStatus,
        /// Transition time.
        timestamp: DateTime<Utc>,
    },

    /// The monitor went down and an incident was opened.
    IncidentOpened {
        /// Monitor identifier.
        monitor_id: MonitorId,
        /// Incident identifier.
        incident_id: IncidentId,
        /// Opening time.
        timestamp: DateTime<Utc>,
    },

    /// An open incident was resolved.
    IncidentResolved {
        /// Monitor identifier.
        monitor_id: MonitorId,
        /// Incident identifier.
        incident_id: IncidentId,
        /// Resolution time.
        timestamp: DateTime<Utc>,
    },

    /// An archived monitor was purged.
    MonitorRemoved {
        /// Monitor identifier.
        monitor_id: MonitorId,
        /// Purge time.
        timestamp: DateTime<Utc>,
    },
}

impl MonitorEvent {
    /// Returns the monitor the event belongs to.
    #[must_use]
    pub fn monitor_id(&self) -> MonitorId {
        match self {
            Self::PingReceived { monitor_id, .. }
            | Self::StatusChanged { monitor_id, .. }
            | Self::IncidentOpened { monitor_id, .. }
            | Self::IncidentResolved { monitor_id, .. }
            | Self::MonitorRemoved { monitor_id, .. } => *monitor_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::PingReceived { .. } => "ping_received",
            Self::StatusChanged { .. } => "status_changed",
            Self::IncidentOpened { .. } => "incident_opened",
            Self::IncidentResolved { .. } => "incident_resolved",
            Self::MonitorRemoved { .. } => "monitor_removed",
        }
    }
}
