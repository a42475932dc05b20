use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::manager::{bounded, DatabaseManager};
use crate::error::InternalError;
use crate::security::rate_limit::{RateLimitDecision, RateLimitPolicy, RateLimitStore};

/// One statement does the whole check: honour an active block, roll an
/// expired window or block, count the request and start a block when the
/// count crosses the ceiling. Row locking on the conflict target makes it
/// atomic per key.
///
/// $1 key, $2 now, $3 now + window, $4 now + block, $5 max requests.
const CHECK_AND_CONSUME: &str = "\
INSERT INTO rate_limit_counters AS c (key, count, window_reset_at, blocked_until, updated_at)
VALUES ($1, 1, $3, CASE WHEN 1 > $5::int4 THEN $4::timestamptz ELSE NULL END, $2)
ON CONFLICT (key) DO UPDATE SET
    count = CASE
        WHEN c.blocked_until > $2 THEN c.count
        WHEN c.blocked_until IS NOT NULL OR c.window_reset_at <= $2 THEN 1
        ELSE c.count + 1
    END,
    window_reset_at = CASE
        WHEN c.blocked_until > $2 THEN c.window_reset_at
        WHEN c.blocked_until IS NOT NULL OR c.window_reset_at <= $2 THEN $3
        ELSE c.window_reset_at
    END,
    blocked_until = CASE
        WHEN c.blocked_until > $2 THEN c.blocked_until
        WHEN c.blocked_until IS NOT NULL OR c.window_reset_at <= $2 THEN
            CASE WHEN 1 > $5::int4 THEN $4::timestamptz ELSE NULL END
        WHEN c.count + 1 > $5::int4 THEN $4::timestamptz
        ELSE NULL
    END,
    updated_at = $2
RETURNING count, window_reset_at, blocked_until";

#[derive(sqlx::FromRow)]
struct CounterRow {
    count: i32,
    window_reset_at: DateTime<Utc>,
    blocked_until: Option<DateTime<Utc>>,
}

/// Counters in the shared `rate_limit_counters` table, for deployments with
/// more than one instance.
#[derive(Clone)]
pub struct PgRateLimitStore {
    pool: PgPool,
    io_timeout: Duration,
}

impl PgRateLimitStore {
    pub fn new(db: &DatabaseManager) -> Self {
        Self {
            pool: db.pool().clone(),
            io_timeout: db.io_timeout(),
        }
    }

    /// Delete counters whose window and block have both ended.
    pub async fn purge_stale(&self, now: DateTime<Utc>) -> Result<u64, InternalError> {
        let result = bounded(
            self.io_timeout,
            "purge rate limit counters",
            sqlx::query(
                "DELETE FROM rate_limit_counters \
                 WHERE window_reset_at <= $1 AND (blocked_until IS NULL OR blocked_until <= $1)",
            )
            .bind(now)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RateLimitStore for PgRateLimitStore {
    async fn check_and_consume(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, InternalError> {
        let max = i32::try_from(policy.max_requests).unwrap_or(i32::MAX);
        let row = bounded(
            self.io_timeout,
            "rate limit check",
            sqlx::query_as::<_, CounterRow>(CHECK_AND_CONSUME)
                .bind(key)
                .bind(now)
                .bind(now + policy.window())
                .bind(now + policy.block_duration())
                .bind(max)
                .fetch_one(&self.pool),
        )
        .await?;

        Ok(RateLimitDecision::from_state(
            policy,
            u32::try_from(row.count).unwrap_or(0),
            row.window_reset_at,
            row.blocked_until,
            now,
        ))
    }
}
