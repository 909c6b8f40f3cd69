//! Broadcast channel for monitor events.
//!
//! A committed command can produce several events at once (a ping that
//! brings a monitor back up yields `ping_received`, `status_changed` and
//! possibly `incident_resolved`). [`EventBus::publish_all`] sends such a
//! batch in order so every WebSocket client sees the same sequence.

use tokio::sync::broadcast;

use super::MonitorEvent;

/// Broadcast bus for [`MonitorEvent`]s.
///
/// When the ring buffer is full the oldest events are dropped for lagging
/// receivers. Publishing never blocks a ping or a sweep.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    /// Creates a bus holding up to `capacity` undelivered events per receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes one event. Returns how many receivers got it; zero when no
    /// client is connected.
    pub fn publish(&self, event: MonitorEvent) -> usize {
        tracing::trace!(
            monitor_id = %event.monitor_id(),
            event_type = event.event_type_str(),
            "publishing monitor event"
        );
        self.sender.send(event).unwrap_or(0)
    }

    /// Publishes a batch produced by one committed command, in order.
    /// Returns the number of events sent.
    pub fn publish_all(&self, events: impl IntoIterator<Item = MonitorEvent>) -> usize {
        events
            .into_iter()
            .map(|event| {
                let _ = self.publish(event);
            })
            .count()
    }

    /// Creates a new receiver for all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    /// Number of connected receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{IncidentId, MonitorId, MonitorStatus, PingKind};
    use chrono::Utc;
    use tokio::sync::broadcast::error::RecvError;

    fn recovery(monitor_id: MonitorId) -> Vec<MonitorEvent> {
        let now = Utc::now();
        vec![
            MonitorEvent::PingReceived {
                monitor_id,
                kind: PingKind::Heartbeat,
                next_expected_at: Some(now),
                timestamp: now,
            },
            MonitorEvent::StatusChanged {
                monitor_id,
                from: MonitorStatus::Down,
                to: MonitorStatus::Healthy,
                timestamp: now,
            },
            MonitorEvent::IncidentResolved {
                monitor_id,
                incident_id: IncidentId::new(),
                timestamp: now,
            },
        ]
    }

    #[test]
    fn publishing_with_no_clients_is_harmless() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish_all(recovery(MonitorId::new())), 3);
        assert_eq!(bus.receiver_count(), 0);
    }

    #[tokio::test]
    async fn recovery_batch_arrives_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let id = MonitorId::new();
        bus.publish_all(recovery(id));

        let mut kinds = Vec::new();
        for _ in 0..3 {
            let Ok(event) = rx.recv().await else {
                panic!("event missing");
            };
            assert_eq!(event.monitor_id(), id);
            kinds.push(event.event_type_str());
        }
        assert_eq!(kinds, ["ping_received", "status_changed", "incident_resolved"]);
    }

    #[tokio::test]
    async fn slow_client_lags_instead_of_blocking_pings() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        let id = MonitorId::new();
        bus.publish_all(recovery(id));

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        let Ok(event) = rx.recv().await else {
            panic!("newest events should survive");
        };
        assert_eq!(event.event_type_str(), "status_changed");
    }
}
