//! WebSocket layer: live monitor event feed.
//!
//! The endpoint at `/ws` streams [`crate::domain::MonitorEvent`]s. Clients
//! choose which monitors to follow with `subscribe` / `unsubscribe`
//! commands carrying `monitor_ids` (or `"*"` for all).

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
