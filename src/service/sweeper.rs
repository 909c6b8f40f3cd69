//! Liveness sweeper: turns silence into LATE/DOWN transitions and incidents.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::publish_applied;
use crate::alert::AlertDispatcher;
use crate::domain::{Command, EventBus, MonitorEvent, MonitorId, MonitorStatus, Outcome};
use crate::error::WatchError;
use crate::persistence::{Applied, MonitorKey, MonitorStore, RateLimiter};

/// Counters for one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepReport {
    /// Overdue candidates examined.
    pub examined: usize,
    /// Monitors moved to LATE.
    pub marked_late: usize,
    /// Monitors moved to DOWN.
    pub marked_down: usize,
    /// Incidents opened.
    pub incidents_opened: usize,
    /// Alert deliveries accepted.
    pub alerts_sent: usize,
    /// Alert deliveries that failed.
    pub alerts_failed: usize,
    /// Archived monitors purged after retention.
    pub purged: usize,
    /// Monitors whose transition failed and was skipped.
    pub errors: usize,
}

/// Periodic deadline checker.
///
/// A pass is safe to abort and re-run: candidates are re-derived from `now`
/// and every transition is decided inside the store's per-monitor atomic
/// unit, so concurrent passes never open a second incident.
#[derive(Debug, Clone)]
pub struct LivenessSweeper {
    store: Arc<dyn MonitorStore>,
    alerts: AlertDispatcher,
    event_bus: EventBus,
    limiter: Option<Arc<dyn RateLimiter>>,
}

impl LivenessSweeper {
    /// Creates a new `LivenessSweeper`.
    #[must_use]
    pub fn new(store: Arc<dyn MonitorStore>, alerts: AlertDispatcher, event_bus: EventBus) -> Self {
        Self {
            store,
            alerts,
            event_bus,
            limiter: None,
        }
    }

    /// Also drops finished rate-limit windows on every pass.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Runs one pass at `now`: transitions every overdue monitor in its own
    /// atomic unit, alerts on every transition into DOWN, then purges expired
    /// archives.
    ///
    /// A failure on one monitor is logged and counted in
    /// [`SweepReport::errors`]; the pass continues with the next.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PersistenceError`] if the candidate query
    /// fails. Nothing has been changed in that case.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, WatchError> {
        let candidates = self.store.overdue(now).await?;
        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };

        for id in candidates {
            match self.store.apply(&MonitorKey::Id(id), &Command::Sweep, now).await {
                Ok(applied) => self.after_transition(&applied, now, &mut report).await,
                Err(WatchError::MonitorNotFound(_)) => {
                    tracing::debug!(monitor_id = %id, "monitor purged during sweep");
                }
                Err(e) => {
                    tracing::warn!(monitor_id = %id, error = %e, "sweep transition failed");
                    report.errors += 1;
                }
            }
        }

        match self.store.purge_expired(now).await {
            Ok(purged) => {
                report.purged = purged.len();
                for monitor_id in purged {
                    self.announce_removed(monitor_id, now);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "archive purge failed");
                report.errors += 1;
            }
        }

        if let Some(limiter) = &self.limiter {
            match limiter.purge_expired(now).await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(windows = n, "expired rate-limit windows dropped"),
                Err(e) => {
                    tracing::warn!(error = %e, "rate-limit purge failed");
                    report.errors += 1;
                }
            }
        }

        if report != SweepReport::default() {
            tracing::info!(
                examined = report.examined,
                late = report.marked_late,
                down = report.marked_down,
                incidents = report.incidents_opened,
                alerts_sent = report.alerts_sent,
                alerts_failed = report.alerts_failed,
                purged = report.purged,
                errors = report.errors,
                "sweep complete"
            );
        }
        Ok(report)
    }

    async fn after_transition(&self, applied: &Applied, now: DateTime<Utc>, report: &mut SweepReport) {
        publish_applied(&self.event_bus, applied, now);
        let monitor = &applied.monitor;
        match applied.outcome {
            Outcome::MarkedLate => {
                report.marked_late += 1;
                tracing::info!(monitor_id = %monitor.id, slug = %monitor.slug, "monitor late");
            }
            Outcome::MarkedDown { opened } => {
                report.marked_down += 1;
                tracing::warn!(
                    monitor_id = %monitor.id,
                    slug = %monitor.slug,
                    new_incident = opened.is_some(),
                    "monitor down"
                );
            }
            _ => return,
        }

        if let Some(incident) = &applied.opened_incident {
            report.incidents_opened += 1;
            tracing::info!(monitor_id = %monitor.id, incident_id = %incident.id, "incident opened");
        }
        if applied.previous_status == MonitorStatus::Down {
            return;
        }
        let Some(incident) = &applied.alert_incident else {
            return;
        };

        let dispatch = self.alerts.dispatch(monitor, incident).await;
        report.alerts_sent += dispatch.delivered.len();
        report.alerts_failed += dispatch.failed;
        if dispatch.delivered.is_empty() {
            return;
        }
        if let Err(e) = self
            .store
            .record_notified(incident.id, &dispatch.delivered)
            .await
        {
            tracing::warn!(
                incident_id = %incident.id,
                error = %e,
                "failed to record notified channels"
            );
            report.errors += 1;
        }
    }

    fn announce_removed(&self, monitor_id: MonitorId, now: DateTime<Utc>) {
        tracing::info!(%monitor_id, "archived monitor purged");
        let _ = self.event_bus.publish(MonitorEvent::MonitorRemoved {
            monitor_id,
            timestamp: now,
        });
    }

    /// Sweeps every `period` until the task is dropped. Failed passes are
    /// logged; the next tick starts from scratch.
    pub async fn run(self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(period_secs = period.as_secs(), "liveness sweeper started");
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep(Utc::now()).await {
                tracing::error!(error = %e, "sweep pass failed");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::alert::AlertSender;
    use crate::alert::tests::{FailingSender, RecordingSender};
    use crate::domain::{AlertChannel, Monitor, NewMonitor, PingKind, PingSource};
    use crate::persistence::{FixedWindow, MemoryRateLimiter};
    use chrono::TimeDelta;

    struct Fixture {
        store: Arc<crate::persistence::MemoryStore>,
        sweeper: LivenessSweeper,
        monitor: Monitor,
        t0: DateTime<Utc>,
    }

    fn secs(s: i64) -> TimeDelta {
        TimeDelta::seconds(s)
    }

    async fn fixture(alerts: AlertDispatcher) -> Fixture {
        let t0 = Utc::now();
        let store = Arc::new(crate::persistence::MemoryStore::new());
        let spec = NewMonitor {
            name: "report".to_string(),
            slug: Some("report".to_string()),
            interval_secs: 300,
            grace_secs: 60,
            alert_email: Some("ops@example.com".to_string()),
            ..NewMonitor::default()
        };
        let Ok(monitor) = Monitor::create(spec, t0) else {
            panic!("valid monitor rejected");
        };
        let Ok(()) = store.insert(&monitor).await else {
            panic!("insert failed");
        };
        let sweeper = LivenessSweeper::new(
            Arc::clone(&store) as Arc<dyn MonitorStore>,
            alerts,
            EventBus::new(64),
        );
        Fixture {
            store,
            sweeper,
            monitor,
            t0,
        }
    }

    async fn ping(f: &Fixture, at: DateTime<Utc>) {
        let command = Command::Ping {
            kind: PingKind::Heartbeat,
            source: PingSource::default(),
            resolve_incident: false,
        };
        let Ok(_) = f.store.apply(&MonitorKey::Id(f.monitor.id), &command, at).await else {
            panic!("ping failed");
        };
    }

    async fn status(f: &Fixture) -> MonitorStatus {
        let Ok(m) = f.store.get(&MonitorKey::Id(f.monitor.id)).await else {
            panic!("monitor vanished");
        };
        m.status
    }

    #[tokio::test]
    async fn scenario_late_then_down_with_one_incident() {
        let email = Arc::new(RecordingSender::default());
        let f = fixture(
            AlertDispatcher::new().with_email(Arc::clone(&email) as Arc<dyn AlertSender>),
        )
        .await;
        ping(&f, f.t0 + secs(10)).await;

        let Ok(r) = f.sweeper.sweep(f.t0 + secs(300)).await else {
            panic!("sweep failed");
        };
        assert_eq!(r.examined, 0);
        assert_eq!(status(&f).await, MonitorStatus::Healthy);

        let Ok(r) = f.sweeper.sweep(f.t0 + secs(350)).await else {
            panic!("sweep failed");
        };
        assert_eq!(r.marked_late, 1);
        assert_eq!(status(&f).await, MonitorStatus::Late);

        let Ok(r) = f.sweeper.sweep(f.t0 + secs(400)).await else {
            panic!("sweep failed");
        };
        assert_eq!(r.marked_down, 1);
        assert_eq!(r.incidents_opened, 1);
        assert_eq!(r.alerts_sent, 1);
        assert_eq!(status(&f).await, MonitorStatus::Down);

        let Ok(incidents) = f.store.incidents(f.monitor.id, 10).await else {
            panic!("incidents failed");
        };
        let [incident] = incidents.as_slice() else {
            panic!("expected one incident, got {incidents:?}");
        };
        assert!(incident.is_open());
        assert_eq!(incident.notified, vec![AlertChannel::Email]);
        assert_eq!(email.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn repeated_sweeps_while_down_open_nothing() {
        let f = fixture(AlertDispatcher::new()).await;
        ping(&f, f.t0).await;
        for offset in [400, 500, 1000, 5000] {
            let Ok(_) = f.sweeper.sweep(f.t0 + secs(offset)).await else {
                panic!("sweep failed");
            };
        }
        let Ok(incidents) = f.store.incidents(f.monitor.id, 10).await else {
            panic!("incidents failed");
        };
        assert_eq!(incidents.iter().filter(|i| i.is_open()).count(), 1);
    }

    #[tokio::test]
    async fn second_outage_alerts_under_still_open_incident() {
        let email = Arc::new(RecordingSender::default());
        let f = fixture(
            AlertDispatcher::new().with_email(Arc::clone(&email) as Arc<dyn AlertSender>),
        )
        .await;
        ping(&f, f.t0).await;

        let Ok(first) = f.sweeper.sweep(f.t0 + secs(400)).await else {
            panic!("sweep failed");
        };
        assert_eq!(first.incidents_opened, 1);
        assert_eq!(first.alerts_sent, 1);

        // Recovery without auto-resolve leaves the incident open.
        ping(&f, f.t0 + secs(500)).await;
        assert_eq!(status(&f).await, MonitorStatus::Healthy);

        let Ok(second) = f.sweeper.sweep(f.t0 + secs(1_000)).await else {
            panic!("sweep failed");
        };
        assert_eq!(second.marked_down, 1);
        assert_eq!(second.incidents_opened, 0);
        assert_eq!(second.alerts_sent, 1);
        assert_eq!(status(&f).await, MonitorStatus::Down);
        assert_eq!(email.sent.lock().await.len(), 2);

        let Ok(incidents) = f.store.incidents(f.monitor.id, 10).await else {
            panic!("incidents failed");
        };
        let [incident] = incidents.as_slice() else {
            panic!("expected one incident, got {incidents:?}");
        };
        assert!(incident.is_open());
        assert_eq!(incident.notified, vec![AlertChannel::Email]);

        let Ok(third) = f.sweeper.sweep(f.t0 + secs(2_000)).await else {
            panic!("sweep failed");
        };
        assert_eq!(third.alerts_sent, 0);
    }

    #[tokio::test]
    async fn sweep_drops_finished_rate_limit_windows() {
        let limiter = Arc::new(MemoryRateLimiter::new(FixedWindow {
            limit: 10,
            window: secs(60),
        }));
        let mut f = fixture(AlertDispatcher::new()).await;
        f.sweeper = f
            .sweeper
            .clone()
            .with_rate_limiter(Arc::clone(&limiter) as Arc<dyn RateLimiter>);
        let _ = limiter.hit("ping:report", f.t0).await;
        let _ = limiter.hit("ping:other", f.t0 + secs(30)).await;

        let Ok(r) = f.sweeper.sweep(f.t0 + secs(60)).await else {
            panic!("sweep failed");
        };
        assert_eq!(r.errors, 0);
        assert_eq!(limiter.tracked_keys().await, 1);
    }

    #[tokio::test]
    async fn failing_alert_does_not_block_down() {
        let f = fixture(AlertDispatcher::new().with_email(Arc::new(FailingSender))).await;
        ping(&f, f.t0).await;
        let Ok(r) = f.sweeper.sweep(f.t0 + secs(400)).await else {
            panic!("sweep failed");
        };
        assert_eq!(r.marked_down, 1);
        assert_eq!(r.alerts_failed, 1);
        assert_eq!(r.errors, 0);
        assert_eq!(status(&f).await, MonitorStatus::Down);

        let Ok(incidents) = f.store.incidents(f.monitor.id, 10).await else {
            panic!("incidents failed");
        };
        let [incident] = incidents.as_slice() else {
            panic!("expected one incident");
        };
        assert!(incident.notified.is_empty());
    }

    #[tokio::test]
    async fn ping_after_late_resets_without_touching_incidents() {
        let f = fixture(AlertDispatcher::new()).await;
        ping(&f, f.t0 + secs(10)).await;
        let Ok(_) = f.sweeper.sweep(f.t0 + secs(350)).await else {
            panic!("sweep failed");
        };
        ping(&f, f.t0 + secs(380)).await;

        let Ok(m) = f.store.get(&MonitorKey::Id(f.monitor.id)).await else {
            panic!("monitor vanished");
        };
        assert_eq!(m.status, MonitorStatus::Healthy);
        assert_eq!(m.next_expected_at, Some(f.t0 + secs(680)));
        let Ok(incidents) = f.store.incidents(f.monitor.id, 10).await else {
            panic!("incidents failed");
        };
        assert!(incidents.is_empty());
    }

    #[tokio::test]
    async fn paused_and_pending_monitors_are_skipped() {
        let f = fixture(AlertDispatcher::new()).await;
        let Ok(r) = f.sweeper.sweep(f.t0 + secs(100_000)).await else {
            panic!("sweep failed");
        };
        assert_eq!(r.examined, 0);
        assert_eq!(status(&f).await, MonitorStatus::Pending);

        ping(&f, f.t0).await;
        let Ok(_) = f
            .store
            .apply(&MonitorKey::Id(f.monitor.id), &Command::Pause, f.t0)
            .await
        else {
            panic!("pause failed");
        };
        let Ok(r) = f.sweeper.sweep(f.t0 + secs(100_000)).await else {
            panic!("sweep failed");
        };
        assert_eq!(r.examined, 0);
        assert_eq!(status(&f).await, MonitorStatus::Paused);
    }

    #[tokio::test]
    async fn sweep_purges_expired_archives() {
        let f = fixture(AlertDispatcher::new()).await;
        let archive = Command::Archive {
            retention: secs(3600),
        };
        let Ok(_) = f
            .store
            .apply(&MonitorKey::Id(f.monitor.id), &archive, f.t0)
            .await
        else {
            panic!("archive failed");
        };

        let Ok(r) = f.sweeper.sweep(f.t0 + secs(60)).await else {
            panic!("sweep failed");
        };
        assert_eq!(r.purged, 0);

        let Ok(r) = f.sweeper.sweep(f.t0 + secs(3600)).await else {
            panic!("sweep failed");
        };
        assert_eq!(r.purged, 1);
        assert!(matches!(
            f.store.get(&MonitorKey::Id(f.monitor.id)).await,
            Err(WatchError::MonitorNotFound(_))
        ));
    }
}
