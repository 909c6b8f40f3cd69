//! Fixed-window request counters keyed by identity.
//!
//! [`MemoryRateLimiter`] is process-local and therefore only correct for a
//! single instance. [`PostgresRateLimiter`] keeps one counter row per key in
//! the shared database, so every instance sees the same window.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::error::WatchError;

/// Stale windows are swept out of the in-memory map once it grows past this.
const PRUNE_THRESHOLD: usize = 10_000;

/// Window length and the number of hits allowed in each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    /// Hits allowed per window. Zero disables limiting.
    pub limit: u32,
    /// Window length.
    pub window: TimeDelta,
}

impl FixedWindow {
    /// Returns `true` when limiting is switched off.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.limit == 0
    }

    fn decide(&self, hits: u32, window_start: DateTime<Utc>, now: DateTime<Utc>) -> RateDecision {
        if hits <= self.limit {
            RateDecision::Allowed {
                remaining: self.limit - hits,
            }
        } else {
            let retry_after = (window_start + self.window - now).max(TimeDelta::zero());
            RateDecision::Limited { retry_after }
        }
    }
}

/// Verdict for one hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Hit counted and accepted.
    Allowed {
        /// Hits left in the current window.
        remaining: u32,
    },
    /// Window exhausted.
    Limited {
        /// Time until the window resets.
        retry_after: TimeDelta,
    },
}

impl RateDecision {
    /// Converts a rejection into [`WatchError::RateLimited`].
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::RateLimited`] for [`RateDecision::Limited`].
    pub fn into_result(self) -> Result<(), WatchError> {
        match self {
            Self::Allowed { .. } => Ok(()),
            Self::Limited { retry_after } => Err(WatchError::RateLimited {
                retry_after_ms: u64::try_from(retry_after.num_milliseconds()).unwrap_or(0),
            }),
        }
    }
}

/// Counts hits per key in fixed windows.
#[async_trait]
pub trait RateLimiter: Send + Sync + std::fmt::Debug {
    /// Records one hit for `key` at `now` and returns the verdict.
    ///
    /// # Errors
    ///
    /// [`WatchError::PersistenceError`] if a shared counter store fails.
    async fn hit(&self, key: &str, now: DateTime<Utc>) -> Result<RateDecision, WatchError>;

    /// Drops counters whose window ended before `now`. Returns how many
    /// were removed.
    ///
    /// # Errors
    ///
    /// [`WatchError::PersistenceError`] if a shared counter store fails.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, WatchError>;
}

/// Process-local fixed-window counter.
#[derive(Debug)]
pub struct MemoryRateLimiter {
    policy: FixedWindow,
    windows: Mutex<HashMap<String, (DateTime<Utc>, u32)>>,
}

impl MemoryRateLimiter {
    /// Creates a limiter with the given policy.
    #[must_use]
    pub fn new(policy: FixedWindow) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys with a live or stale counter.
    pub async fn tracked_keys(&self) -> usize {
        self.windows.lock().await.len()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn hit(&self, key: &str, now: DateTime<Utc>) -> Result<RateDecision, WatchError> {
        if self.policy.is_disabled() {
            return Ok(RateDecision::Allowed { remaining: u32::MAX });
        }
        let mut windows = self.windows.lock().await;
        if windows.len() > PRUNE_THRESHOLD {
            let window = self.policy.window;
            windows.retain(|_, (start, _)| *start + window > now);
        }
        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if entry.0 + self.policy.window <= now {
            *entry = (now, 0);
        }
        entry.1 = entry.1.saturating_add(1);
        Ok(self.policy.decide(entry.1, entry.0, now))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, WatchError> {
        let window = self.policy.window;
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, (start, _)| *start + window > now);
        Ok(before - windows.len())
    }
}

/// Fixed-window counter shared through the `rate_limits` table.
#[derive(Debug, Clone)]
pub struct PostgresRateLimiter {
    pool: PgPool,
    policy: FixedWindow,
}

impl PostgresRateLimiter {
    /// Creates a limiter over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool, policy: FixedWindow) -> Self {
        Self { pool, policy }
    }
}

#[async_trait]
impl RateLimiter for PostgresRateLimiter {
    async fn hit(&self, key: &str, now: DateTime<Utc>) -> Result<RateDecision, WatchError> {
        if self.policy.is_disabled() {
            return Ok(RateDecision::Allowed { remaining: u32::MAX });
        }
        let expired_before = now - self.policy.window;
        let (window_start, hits) = sqlx::query_as::<_, (DateTime<Utc>, i32)>(
            "INSERT INTO rate_limits (key, window_start, hits) VALUES ($1, $2, 1) \
             ON CONFLICT (key) DO UPDATE SET \
               hits = CASE WHEN rate_limits.window_start <= $3 THEN 1 \
                           ELSE rate_limits.hits + 1 END, \
               window_start = CASE WHEN rate_limits.window_start <= $3 THEN $2 \
                                   ELSE rate_limits.window_start END \
             RETURNING window_start, hits",
        )
        .bind(key)
        .bind(now)
        .bind(expired_before)
        .fetch_one(&self.pool)
        .await?;

        let hits = u32::try_from(hits).unwrap_or(u32::MAX);
        Ok(self.policy.decide(hits, window_start, now))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, WatchError> {
        let result = sqlx::query("DELETE FROM rate_limits WHERE window_start <= $1")
            .bind(now - self.policy.window)
            .execute(&self.pool)
            .await?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn policy(limit: u32) -> FixedWindow {
        FixedWindow {
            limit,
            window: TimeDelta::seconds(60),
        }
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_rejects() {
        let limiter = MemoryRateLimiter::new(policy(2));
        let now = Utc::now();
        let first = limiter.hit("ping:a", now).await;
        let second = limiter.hit("ping:a", now).await;
        let third = limiter.hit("ping:a", now + TimeDelta::seconds(10)).await;

        assert!(matches!(first, Ok(RateDecision::Allowed { remaining: 1 })));
        assert!(matches!(second, Ok(RateDecision::Allowed { remaining: 0 })));
        let Ok(RateDecision::Limited { retry_after }) = third else {
            panic!("expected rejection, got {third:?}");
        };
        assert_eq!(retry_after, TimeDelta::seconds(50));
    }

    #[tokio::test]
    async fn window_resets_after_expiry() {
        let limiter = MemoryRateLimiter::new(policy(1));
        let now = Utc::now();
        let _ = limiter.hit("ping:a", now).await;
        assert!(matches!(
            limiter.hit("ping:a", now).await,
            Ok(RateDecision::Limited { .. })
        ));
        assert!(matches!(
            limiter.hit("ping:a", now + TimeDelta::seconds(60)).await,
            Ok(RateDecision::Allowed { .. })
        ));
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = MemoryRateLimiter::new(policy(1));
        let now = Utc::now();
        let _ = limiter.hit("ping:a", now).await;
        assert!(matches!(
            limiter.hit("ping:b", now).await,
            Ok(RateDecision::Allowed { .. })
        ));
    }

    #[tokio::test]
    async fn zero_limit_disables() {
        let limiter = MemoryRateLimiter::new(policy(0));
        let now = Utc::now();
        for _ in 0..100 {
            assert!(matches!(
                limiter.hit("ping:a", now).await,
                Ok(RateDecision::Allowed { .. })
            ));
        }
    }

    #[tokio::test]
    async fn purge_drops_only_finished_windows() {
        let limiter = MemoryRateLimiter::new(policy(5));
        let now = Utc::now();
        let _ = limiter.hit("ping:old", now).await;
        let _ = limiter.hit("ping:fresh", now + TimeDelta::seconds(30)).await;

        let purged = limiter.purge_expired(now + TimeDelta::seconds(60)).await;
        assert!(matches!(purged, Ok(1)));
        assert_eq!(limiter.tracked_keys().await, 1);
        assert!(matches!(
            limiter.hit("ping:fresh", now + TimeDelta::seconds(61)).await,
            Ok(RateDecision::Allowed { remaining: 3 })
        ));
    }

    #[test]
    fn limited_maps_to_error() {
        let decision = RateDecision::Limited {
            retry_after: TimeDelta::milliseconds(1500),
        };
        assert!(matches!(
            decision.into_result(),
            Err(WatchError::RateLimited { retry_after_ms: 1500 })
        ));
    }
}
