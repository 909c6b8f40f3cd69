//! # cronwatch
//!
//! Dead man's switch monitoring for scheduled jobs.
//!
//! Jobs ping a per-monitor URL when they run. The [`service::PingIngestor`]
//! records each ping and moves the monitor's deadline forward; the
//! [`service::LivenessSweeper`] periodically looks for monitors whose
//! deadline has passed, marks them late and then down, opens an incident
//! and dispatches alerts over email and webhooks.
//!
//! ## Architecture
//!
//! ```text
//! Jobs (HTTP pings)      Operators (REST, WebSocket)
//!     │                          │
//!     ├── Ping handlers (api/)   ├── Monitor handlers (api/), WS feed (ws/)
//!     │                          │
//!     ├── PingIngestor     MonitorService     LivenessSweeper ── alert/
//!     │                          │
//!     ├── liveness::plan (domain/), EventBus (domain/)
//!     │
//!     └── MonitorStore: in-memory or PostgreSQL (persistence/)
//! ```
//!
//! Every state change of a monitor is decided by the pure
//! [`domain::liveness::plan`] function and committed by
//! [`persistence::MonitorStore::apply`] as one atomic unit per monitor.

pub mod alert;
pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;
