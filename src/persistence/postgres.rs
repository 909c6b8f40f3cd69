//! PostgreSQL implementation of the monitor store.
//!
//! Each [`MonitorStore::apply`] runs in its own transaction: the monitor row
//! and its open incident are read `FOR UPDATE`, the liveness planner runs on
//! that locked state, and the plan's writes are committed together. A
//! partial unique index on `incidents (monitor_id) WHERE resolved_at IS NULL`
//! backs the one-open-incident rule at the schema level.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};

use super::models::{
    INCIDENT_COLUMNS, IncidentRow, MONITOR_COLUMNS, MonitorRow, PING_COLUMNS, PingRow,
    channel_names,
};
use super::{Applied, MonitorKey, MonitorQuery, MonitorStore};
use crate::config::ServiceConfig;
use crate::domain::{
    AlertChannel, Archival, Command, Incident, IncidentId, Monitor, MonitorId, MonitorStatus,
    Ping, liveness,
};
use crate::error::WatchError;

/// PostgreSQL-backed monitor store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the database settings in `config` and runs the
    /// bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PersistenceError`] if the database is
    /// unreachable or a migration fails.
    pub async fn connect(config: &ServiceConfig) -> Result<Self, WatchError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(std::time::Duration::from_secs(
                config.database_connect_timeout_secs,
            ))
            .connect(&config.database_url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| WatchError::PersistenceError(e.to_string()))?;
        tracing::info!("database migrations applied");
        Ok(Self::new(pool))
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn lock_monitor(
        conn: &mut PgConnection,
        key: &MonitorKey,
    ) -> Result<Option<MonitorRow>, WatchError> {
        let row = match key {
            MonitorKey::Id(id) => {
                sqlx::query_as::<_, MonitorRow>(&format!(
                    "SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = $1 FOR UPDATE"
                ))
                .bind(id.as_uuid())
                .fetch_optional(&mut *conn)
                .await?
            }
            MonitorKey::Slug(slug) => {
                sqlx::query_as::<_, MonitorRow>(&format!(
                    "SELECT {MONITOR_COLUMNS} FROM monitors WHERE slug = $1 FOR UPDATE"
                ))
                .bind(slug.as_str())
                .fetch_optional(&mut *conn)
                .await?
            }
        };
        Ok(row)
    }

    async fn write_monitor(conn: &mut PgConnection, monitor: &Monitor) -> Result<(), WatchError> {
        let (archived_at, delete_after) = match monitor.archival {
            Archival::Active => (None, None),
            Archival::Archived {
                archived_at,
                delete_after,
            } => (Some(archived_at), Some(delete_after)),
        };
        sqlx::query(
            "UPDATE monitors SET name = $2, interval_secs = $3, grace_secs = $4, status = $5, \
             last_ping_at = $6, last_started_at = $7, next_expected_at = $8, alert_email = $9, \
             alert_webhook_url = $10, archived_at = $11, delete_after = $12, updated_at = $13 \
             WHERE id = $1",
        )
        .bind(monitor.id.as_uuid())
        .bind(&monitor.name)
        .bind(schedule_column(monitor.schedule.interval_secs()))
        .bind(schedule_column(monitor.schedule.grace_secs()))
        .bind(monitor.status.as_str())
        .bind(monitor.last_ping_at)
        .bind(monitor.last_started_at)
        .bind(monitor.next_expected_at)
        .bind(monitor.alerts.email.as_deref())
        .bind(monitor.alerts.webhook_url.as_deref())
        .bind(archived_at)
        .bind(delete_after)
        .bind(monitor.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn ensure_monitor(&self, id: MonitorId) -> Result<(), WatchError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM monitors WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(())
        } else {
            Err(WatchError::MonitorNotFound(id.to_string()))
        }
    }

    async fn purge_one(&self, id: MonitorId, now: DateTime<Utc>) -> Result<bool, WatchError> {
        let mut tx = self.pool.begin().await?;
        let still_due = sqlx::query_scalar::<_, uuid::Uuid>(
            "SELECT id FROM monitors WHERE id = $1 AND archived_at IS NOT NULL \
             AND delete_after <= $2 FOR UPDATE",
        )
        .bind(id.as_uuid())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;
        if still_due.is_none() {
            return Ok(false);
        }
        sqlx::query("DELETE FROM pings WHERE monitor_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM incidents WHERE monitor_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM monitors WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl MonitorStore for PostgresStore {
    async fn insert(&self, monitor: &Monitor) -> Result<(), WatchError> {
        let result = sqlx::query(
            "INSERT INTO monitors (id, name, slug, owner_id, interval_secs, grace_secs, status, \
             alert_email, alert_webhook_url, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(monitor.id.as_uuid())
        .bind(&monitor.name)
        .bind(monitor.slug.as_str())
        .bind(monitor.owner_id.as_deref())
        .bind(schedule_column(monitor.schedule.interval_secs()))
        .bind(schedule_column(monitor.schedule.grace_secs()))
        .bind(monitor.status.as_str())
        .bind(monitor.alerts.email.as_deref())
        .bind(monitor.alerts.webhook_url.as_deref())
        .bind(monitor.created_at)
        .bind(monitor.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(WatchError::SlugTaken(monitor.slug.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &MonitorKey) -> Result<Monitor, WatchError> {
        let row = match key {
            MonitorKey::Id(id) => {
                sqlx::query_as::<_, MonitorRow>(&format!(
                    "SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = $1"
                ))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?
            }
            MonitorKey::Slug(slug) => {
                sqlx::query_as::<_, MonitorRow>(&format!(
                    "SELECT {MONITOR_COLUMNS} FROM monitors WHERE slug = $1"
                ))
                .bind(slug.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
        };
        row.ok_or_else(|| key.not_found())?.try_into()
    }

    async fn list(&self, query: &MonitorQuery) -> Result<Vec<Monitor>, WatchError> {
        let rows = sqlx::query_as::<_, MonitorRow>(&format!(
            "SELECT {MONITOR_COLUMNS} FROM monitors \
             WHERE ($1 OR archived_at IS NULL) AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at, id"
        ))
        .bind(query.include_archived)
        .bind(query.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Monitor::try_from).collect()
    }

    async fn apply(
        &self,
        key: &MonitorKey,
        command: &Command,
        now: DateTime<Utc>,
    ) -> Result<Applied, WatchError> {
        let mut tx = self.pool.begin().await?;

        let row = Self::lock_monitor(&mut tx, key)
            .await?
            .ok_or_else(|| key.not_found())?;
        let monitor = Monitor::try_from(row)?;

        let open: Option<Incident> = sqlx::query_as::<_, IncidentRow>(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents \
             WHERE monitor_id = $1 AND resolved_at IS NULL FOR UPDATE"
        ))
        .bind(monitor.id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .map(Incident::from);

        let plan = liveness::plan(&monitor, open.as_ref(), command, now)?;
        if plan.is_noop() {
            tx.rollback().await?;
            return Ok(Applied::from_plan(monitor, plan));
        }

        if let Some(next) = &plan.monitor {
            Self::write_monitor(&mut tx, next).await?;
        }
        if let Some(ping) = &plan.ping {
            sqlx::query(
                "INSERT INTO pings (id, monitor_id, kind, received_at, source_ip, user_agent) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(ping.id.as_uuid())
            .bind(ping.monitor_id.as_uuid())
            .bind(ping.kind.as_str())
            .bind(ping.received_at)
            .bind(ping.source.ip.as_deref())
            .bind(ping.source.user_agent.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        if let Some(incident_id) = plan.resolve_incident {
            sqlx::query("UPDATE incidents SET resolved_at = $2 WHERE id = $1")
                .bind(incident_id.as_uuid())
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(incident) = &plan.open_incident {
            sqlx::query(
                "INSERT INTO incidents (id, monitor_id, started_at, resolved_at, notified) \
                 VALUES ($1, $2, $3, NULL, $4)",
            )
            .bind(incident.id.as_uuid())
            .bind(incident.monitor_id.as_uuid())
            .bind(incident.started_at)
            .bind(channel_names(&incident.notified))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Applied::from_plan(monitor, plan))
    }

    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<MonitorId>, WatchError> {
        let statuses: Vec<&str> = MonitorStatus::SWEEPABLE.iter().map(|s| s.as_str()).collect();
        let ids = sqlx::query_scalar::<_, uuid::Uuid>(
            "SELECT id FROM monitors \
             WHERE archived_at IS NULL AND status = ANY($1) AND next_expected_at <= $2 \
             ORDER BY next_expected_at",
        )
        .bind(statuses)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(MonitorId::from_uuid).collect())
    }

    async fn pings(&self, id: MonitorId, limit: usize) -> Result<Vec<Ping>, WatchError> {
        self.ensure_monitor(id).await?;
        let rows = sqlx::query_as::<_, PingRow>(&format!(
            "SELECT {PING_COLUMNS} FROM pings WHERE monitor_id = $1 \
             ORDER BY received_at DESC LIMIT $2"
        ))
        .bind(id.as_uuid())
        .bind(limit_column(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Ping::try_from).collect()
    }

    async fn incidents(&self, id: MonitorId, limit: usize) -> Result<Vec<Incident>, WatchError> {
        self.ensure_monitor(id).await?;
        let rows = sqlx::query_as::<_, IncidentRow>(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE monitor_id = $1 \
             ORDER BY started_at DESC LIMIT $2"
        ))
        .bind(id.as_uuid())
        .bind(limit_column(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Incident::from).collect())
    }

    async fn record_notified(
        &self,
        incident_id: IncidentId,
        channels: &[AlertChannel],
    ) -> Result<(), WatchError> {
        let result = sqlx::query(
            "UPDATE incidents \
             SET notified = ARRAY(SELECT DISTINCT unnest(notified || $2::text[])) \
             WHERE id = $1",
        )
        .bind(incident_id.as_uuid())
        .bind(channel_names(channels))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(WatchError::IncidentNotFound(*incident_id.as_uuid()));
        }
        Ok(())
    }

    async fn resolve_incident(
        &self,
        monitor_id: MonitorId,
        incident_id: IncidentId,
        at: DateTime<Utc>,
    ) -> Result<Incident, WatchError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, IncidentRow>(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = $1 AND monitor_id = $2 FOR UPDATE"
        ))
        .bind(incident_id.as_uuid())
        .bind(monitor_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(WatchError::IncidentNotFound(*incident_id.as_uuid()))?;

        let mut incident = Incident::from(row);
        if !incident.is_open() {
            return Err(WatchError::InvalidState(format!(
                "incident {incident_id} is already resolved"
            )));
        }
        sqlx::query("UPDATE incidents SET resolved_at = $2 WHERE id = $1")
            .bind(incident_id.as_uuid())
            .bind(at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        incident.resolved_at = Some(at);
        Ok(incident)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<MonitorId>, WatchError> {
        let candidates = sqlx::query_scalar::<_, uuid::Uuid>(
            "SELECT id FROM monitors WHERE archived_at IS NOT NULL AND delete_after <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut purged = Vec::with_capacity(candidates.len());
        for uuid in candidates {
            let id = MonitorId::from_uuid(uuid);
            match self.purge_one(id, now).await {
                Ok(true) => purged.push(id),
                Ok(false) => {}
                Err(e) => tracing::warn!(monitor_id = %id, error = %e, "purge failed"),
            }
        }
        Ok(purged)
    }
}

/// Schedule values are bounded well below `i32::MAX`.
fn schedule_column(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn limit_column(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
