//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::alert::AlertDispatcher;
use crate::config::ServiceConfig;
use crate::domain::EventBus;
use crate::persistence::MonitorStore;
use crate::persistence::rate_limit::RateLimiter;
use crate::service::{LivenessSweeper, MonitorService, PingIngestor};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Monitor management operations.
    pub monitors: Arc<MonitorService>,
    /// Ping ingestion.
    pub ingestor: Arc<PingIngestor>,
    /// Liveness sweeper, also driven by `POST /internal/sweep`.
    pub sweeper: Arc<LivenessSweeper>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
    /// Loaded configuration.
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    /// Wires the services over one store, rate limiter and alert dispatcher.
    #[must_use]
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn MonitorStore>,
        limiter: Arc<dyn RateLimiter>,
        alerts: AlertDispatcher,
    ) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);
        let monitors = MonitorService::new(
            Arc::clone(&store),
            event_bus.clone(),
            config.archive_retention(),
        );
        let ingestor = PingIngestor::new(
            Arc::clone(&store),
            Arc::clone(&limiter),
            event_bus.clone(),
            config.incident_auto_resolve,
        );
        let sweeper =
            LivenessSweeper::new(store, alerts, event_bus.clone()).with_rate_limiter(limiter);

        Self {
            monitors: Arc::new(monitors),
            ingestor: Arc::new(ingestor),
            sweeper: Arc::new(sweeper),
            event_bus,
            config: Arc::new(config),
        }
    }
}
