//! Which monitors a WebSocket client follows.
//!
//! A client either follows every monitor (`"*"`) or an explicit set of
//! monitor ids. Purged monitors drop out of the set once their
//! `monitor_removed` event has been delivered, so a long-lived dashboard
//! does not accumulate dead ids.

use std::collections::HashSet;

use crate::domain::{MonitorEvent, MonitorId};

/// Explicit ids one connection may follow.
pub const MAX_MONITORS_PER_CONNECTION: usize = 1_000;

/// Subscription state of a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    monitor_ids: HashSet<MonitorId>,
    follow_all: bool,
}

impl SubscriptionManager {
    /// Creates a manager that follows nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Follows `ids` (and everything when `wildcard`). Ids beyond
    /// [`MAX_MONITORS_PER_CONNECTION`] are ignored. Returns the ids that
    /// were newly added.
    pub fn subscribe(&mut self, ids: &[MonitorId], wildcard: bool) -> Vec<MonitorId> {
        if wildcard {
            self.follow_all = true;
        }
        let mut added = Vec::new();
        for id in ids {
            if self.monitor_ids.len() >= MAX_MONITORS_PER_CONNECTION {
                break;
            }
            if self.monitor_ids.insert(*id) {
                added.push(*id);
            }
        }
        added
    }

    /// Stops following `ids`; `wildcard` turns off follow-all.
    pub fn unsubscribe(&mut self, ids: &[MonitorId], wildcard: bool) {
        if wildcard {
            self.follow_all = false;
        }
        for id in ids {
            self.monitor_ids.remove(id);
        }
    }

    /// Decides whether `event` goes to this client. A delivered
    /// `monitor_removed` also forgets the monitor.
    pub fn forward(&mut self, event: &MonitorEvent) -> bool {
        let monitor_id = event.monitor_id();
        let followed = self.monitor_ids.contains(&monitor_id);
        if followed && matches!(event, MonitorEvent::MonitorRemoved { .. }) {
            self.monitor_ids.remove(&monitor_id);
        }
        self.follow_all || followed
    }

    /// Returns `true` if the client follows `monitor_id`.
    #[must_use]
    pub fn follows(&self, monitor_id: MonitorId) -> bool {
        self.follow_all || self.monitor_ids.contains(&monitor_id)
    }

    /// Number of explicitly followed monitors.
    #[must_use]
    pub fn count(&self) -> usize {
        self.monitor_ids.len()
    }

    /// Returns `true` while follow-all is on.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.follow_all
    }
}
