//! Domain layer: monitor records, the liveness state machine, and events.
//!
//! Everything here is storage-agnostic. The [`liveness`] planner is a pure
//! function of current state and a command; persistence and alerting live
//! in their own layers.

pub mod event;
pub mod event_bus;
pub mod ids;
pub mod incident;
pub mod liveness;
pub mod monitor;
pub mod ping;
pub mod slug;

pub use event::MonitorEvent;
pub use event_bus::EventBus;
pub use ids::{IncidentId, MonitorId, PingId};
pub use incident::{AlertChannel, Incident};
pub use liveness::{Command, Outcome, Plan};
pub use monitor::{
    AlertTargets, Archival, Monitor, MonitorPatch, MonitorStatus, NewMonitor, Schedule,
};
pub use ping::{Ping, PingKind, PingSource};
pub use slug::Slug;
