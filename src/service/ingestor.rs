//! Ping ingestor: records heartbeats and advances deadlines.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::publish_applied;
use crate::domain::{Command, EventBus, Outcome, PingKind, PingSource, Slug};
use crate::error::WatchError;
use crate::persistence::{MonitorKey, MonitorStore, RateLimiter};

/// Result of one accepted ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingResult {
    /// Heartbeat recorded; the monitor is due again at `next`.
    Ok {
        /// New deadline.
        next: DateTime<Utc>,
    },
    /// Start recorded.
    Running {
        /// Recorded start time.
        started_at: DateTime<Utc>,
    },
    /// Monitor is paused; nothing was recorded.
    Paused,
}

/// Accepts pings addressed by slug.
///
/// Each accepted ping is one call to [`MonitorStore::apply`], so the
/// monitor update and the ping record commit together or not at all.
/// Pings are not idempotent: every call appends a record and moves the
/// deadline.
#[derive(Debug, Clone)]
pub struct PingIngestor {
    store: Arc<dyn MonitorStore>,
    limiter: Arc<dyn RateLimiter>,
    event_bus: EventBus,
    auto_resolve: bool,
}

impl PingIngestor {
    /// Creates a new `PingIngestor`.
    ///
    /// With `auto_resolve` a heartbeat resolves the monitor's open incident.
    #[must_use]
    pub fn new(
        store: Arc<dyn MonitorStore>,
        limiter: Arc<dyn RateLimiter>,
        event_bus: EventBus,
        auto_resolve: bool,
    ) -> Self {
        Self {
            store,
            limiter,
            event_bus,
            auto_resolve,
        }
    }

    /// Records a `kind` ping for the monitor with `slug` at `now`.
    ///
    /// # Errors
    ///
    /// - [`WatchError::RateLimited`] when the slug exceeded its window.
    /// - [`WatchError::MonitorNotFound`] for unknown, malformed or archived
    ///   slugs.
    /// - [`WatchError::PersistenceError`] on storage failure; the caller may
    ///   retry.
    pub async fn ingest(
        &self,
        slug: &str,
        kind: PingKind,
        source: PingSource,
        now: DateTime<Utc>,
    ) -> Result<PingResult, WatchError> {
        let slug =
            Slug::new(slug).map_err(|_| WatchError::MonitorNotFound(slug.to_string()))?;
        let key = MonitorKey::Slug(slug.clone());

        // Only live monitors are charged, so unknown slugs leave no counters.
        if self.store.get(&key).await?.is_archived() {
            return Err(key.not_found());
        }
        self.limiter
            .hit(&format!("ping:{slug}"), now)
            .await?
            .into_result()?;

        let command = Command::Ping {
            kind,
            source,
            resolve_incident: self.auto_resolve,
        };
        let applied = self.store.apply(&key, &command, now).await?;
        publish_applied(&self.event_bus, &applied, now);

        let monitor_id = applied.monitor.id;
        if applied.status_changed() {
            tracing::info!(
                %monitor_id,
                slug = %slug,
                from = %applied.previous_status,
                to = %applied.monitor.status,
                "monitor status changed by ping"
            );
        }
        if let Some(incident_id) = applied.resolved_incident {
            tracing::info!(%monitor_id, %incident_id, "incident resolved by heartbeat");
        }

        match applied.outcome {
            Outcome::Pinged { next_expected_at } => {
                tracing::debug!(%monitor_id, next = %next_expected_at, "heartbeat recorded");
                Ok(PingResult::Ok {
                    next: next_expected_at,
                })
            }
            Outcome::Started { started_at } => {
                tracing::debug!(%monitor_id, "start recorded");
                Ok(PingResult::Running { started_at })
            }
            Outcome::PausedIgnored => {
                tracing::debug!(%monitor_id, "ping ignored, monitor paused");
                Ok(PingResult::Paused)
            }
            other => Err(WatchError::Internal(format!(
                "unexpected ping outcome: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Monitor, MonitorEvent, MonitorStatus, NewMonitor};
    use crate::persistence::{FixedWindow, MemoryRateLimiter, MemoryStore, MonitorQuery};
    use chrono::TimeDelta;

    struct Fixture {
        store: Arc<MemoryStore>,
        limiter: Arc<MemoryRateLimiter>,
        ingestor: PingIngestor,
        bus: EventBus,
        monitor: Monitor,
        t0: DateTime<Utc>,
    }

    async fn fixture(limit: u32, auto_resolve: bool) -> Fixture {
        let t0 = Utc::now();
        let store = Arc::new(MemoryStore::new());
        let spec = NewMonitor {
            name: "backup".to_string(),
            slug: Some("backup".to_string()),
            interval_secs: 300,
            grace_secs: 60,
            ..NewMonitor::default()
        };
        let Ok(monitor) = Monitor::create(spec, t0) else {
            panic!("valid monitor rejected");
        };
        let Ok(()) = store.insert(&monitor).await else {
            panic!("insert failed");
        };
        let limiter = Arc::new(MemoryRateLimiter::new(FixedWindow {
            limit,
            window: TimeDelta::seconds(60),
        }));
        let bus = EventBus::new(64);
        let ingestor = PingIngestor::new(
            Arc::clone(&store) as Arc<dyn MonitorStore>,
            Arc::clone(&limiter) as Arc<dyn RateLimiter>,
            bus.clone(),
            auto_resolve,
        );
        Fixture {
            store,
            limiter,
            ingestor,
            bus,
            monitor,
            t0,
        }
    }

    #[tokio::test]
    async fn heartbeat_returns_new_deadline() {
        let f = fixture(0, true).await;
        let at = f.t0 + TimeDelta::seconds(10);
        let result = f
            .ingestor
            .ingest("backup", PingKind::Heartbeat, PingSource::default(), at)
            .await;
        assert_eq!(
            result.ok(),
            Some(PingResult::Ok {
                next: at + TimeDelta::seconds(300)
            })
        );
    }

    #[tokio::test]
    async fn start_returns_running() {
        let f = fixture(0, true).await;
        let at = f.t0 + TimeDelta::seconds(5);
        let result = f
            .ingestor
            .ingest("backup", PingKind::Start, PingSource::default(), at)
            .await;
        assert_eq!(result.ok(), Some(PingResult::Running { started_at: at }));
    }

    #[tokio::test]
    async fn paused_monitor_swallows_pings() {
        let f = fixture(0, true).await;
        let key = MonitorKey::Id(f.monitor.id);
        let Ok(_) = f.store.apply(&key, &Command::Pause, f.t0).await else {
            panic!("pause failed");
        };
        for i in 1..=3 {
            let result = f
                .ingestor
                .ingest(
                    "backup",
                    PingKind::Heartbeat,
                    PingSource::default(),
                    f.t0 + TimeDelta::seconds(i),
                )
                .await;
            assert_eq!(result.ok(), Some(PingResult::Paused));
        }
        let Ok(after) = f.store.get(&key).await else {
            panic!("monitor vanished");
        };
        assert_eq!(after.status, MonitorStatus::Paused);
        assert_eq!(after.last_ping_at, None);
        assert_eq!(after.next_expected_at, None);
        let Ok(pings) = f.store.pings(f.monitor.id, 10).await else {
            panic!("pings failed");
        };
        assert!(pings.is_empty());
    }

    #[tokio::test]
    async fn unknown_and_malformed_slugs_are_not_found() {
        let f = fixture(0, true).await;
        for slug in ["nope", "Not A Slug!"] {
            let result = f
                .ingestor
                .ingest(slug, PingKind::Heartbeat, PingSource::default(), f.t0)
                .await;
            assert!(matches!(result, Err(WatchError::MonitorNotFound(_))));
        }
    }

    #[tokio::test]
    async fn rate_limit_rejects_excess_pings() {
        let f = fixture(2, true).await;
        for _ in 0..2 {
            let result = f
                .ingestor
                .ingest("backup", PingKind::Heartbeat, PingSource::default(), f.t0)
                .await;
            assert!(result.is_ok());
        }
        let result = f
            .ingestor
            .ingest("backup", PingKind::Heartbeat, PingSource::default(), f.t0)
            .await;
        assert!(matches!(result, Err(WatchError::RateLimited { .. })));
        let Ok(pings) = f.store.pings(f.monitor.id, 10).await else {
            panic!("pings failed");
        };
        assert_eq!(pings.len(), 2);
    }

    #[tokio::test]
    async fn unknown_slugs_are_not_charged() {
        let f = fixture(2, true).await;
        for i in 0..5 {
            let result = f
                .ingestor
                .ingest(&format!("nope-{i}"), PingKind::Heartbeat, PingSource::default(), f.t0)
                .await;
            assert!(matches!(result, Err(WatchError::MonitorNotFound(_))));
        }
        assert_eq!(f.limiter.tracked_keys().await, 0);

        let result = f
            .ingestor
            .ingest("backup", PingKind::Heartbeat, PingSource::default(), f.t0)
            .await;
        assert!(result.is_ok());
        assert_eq!(f.limiter.tracked_keys().await, 1);
    }

    #[tokio::test]
    async fn archived_slug_is_not_found_and_not_charged() {
        let f = fixture(2, true).await;
        let archive = Command::Archive {
            retention: TimeDelta::days(30),
        };
        let Ok(_) = f.store.apply(&MonitorKey::Id(f.monitor.id), &archive, f.t0).await else {
            panic!("archive failed");
        };
        let result = f
            .ingestor
            .ingest("backup", PingKind::Heartbeat, PingSource::default(), f.t0)
            .await;
        assert!(matches!(result, Err(WatchError::MonitorNotFound(_))));
        assert_eq!(f.limiter.tracked_keys().await, 0);
    }

    #[tokio::test]
    async fn ping_publishes_events() {
        let f = fixture(0, true).await;
        let mut rx = f.bus.subscribe();
        let _ = f
            .ingestor
            .ingest("backup", PingKind::Heartbeat, PingSource::default(), f.t0)
            .await;

        let Ok(first) = rx.recv().await else {
            panic!("no event");
        };
        assert!(matches!(first, MonitorEvent::PingReceived { kind: PingKind::Heartbeat, .. }));
        let Ok(second) = rx.recv().await else {
            panic!("no status event");
        };
        let MonitorEvent::StatusChanged { from, to, .. } = second else {
            panic!("expected status change, got {second:?}");
        };
        assert_eq!(from, MonitorStatus::Pending);
        assert_eq!(to, MonitorStatus::Healthy);
    }

    #[tokio::test]
    async fn heartbeat_after_down_resolves_only_with_auto_resolve() {
        for auto_resolve in [true, false] {
            let f = fixture(0, auto_resolve).await;
            let key = MonitorKey::Id(f.monitor.id);
            let _ = f
                .ingestor
                .ingest("backup", PingKind::Heartbeat, PingSource::default(), f.t0)
                .await;
            let Ok(down) = f
                .store
                .apply(&key, &Command::Sweep, f.t0 + TimeDelta::seconds(400))
                .await
            else {
                panic!("sweep failed");
            };
            assert_eq!(down.monitor.status, MonitorStatus::Down);

            let _ = f
                .ingestor
                .ingest(
                    "backup",
                    PingKind::Heartbeat,
                    PingSource::default(),
                    f.t0 + TimeDelta::seconds(500),
                )
                .await;
            let Ok(incidents) = f.store.incidents(f.monitor.id, 10).await else {
                panic!("incidents failed");
            };
            let Some(incident) = incidents.first() else {
                panic!("no incident");
            };
            assert_eq!(incident.is_open(), !auto_resolve);

            let Ok(list) = f.store.list(&MonitorQuery::default()).await else {
                panic!("list failed");
            };
            assert!(list.iter().all(|m| m.status == MonitorStatus::Healthy));
        }
    }
}
