//! Distributed mutual-exclusion locks.
//!
//! Serializes concurrent attempts at the same job occurrence across process
//! instances. Acquisition cascades through three strategies:
//!
//! 1. PostgreSQL advisory lock (`pg_try_advisory_lock`), non-blocking,
//!    connection-scoped. The connection that took the lock is held inside
//!    the lease and reused to unlock.
//! 2. Table-based pessimistic lock with an expiry, when the advisory
//!    primitive is unavailable.
//! 3. A last-resort in-process "lock" that always reports success. This
//!    provides no cross-process exclusion and is logged loudly.
//!
//! Release is best-effort: a stuck lock is recovered via row expiry (table
//! path) or connection teardown (advisory path), not via guaranteed release.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use chrono::Utc;
use sea_query::{Expr, PostgresQueryBuilder, Query};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};
use tracing::{debug, warn};

use crate::storage::schema::JobLock;

/// Which strategy actually backs an acquired lock. Anything weaker than
/// `Advisory` means the safety guarantee was silently weakened and has been
/// logged at WARN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategy {
    Advisory,
    Table,
    Memory,
}

/// Options for one acquisition attempt.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Expiry for the table-based fallback row; abandoned locks become
    /// reclaimable after this long.
    pub timeout: Duration,
    /// Delay between retries.
    pub retry_interval: Duration,
    /// `0` means try once and fail fast, which is what the scheduled path
    /// wants: an overlapping run is skipped, not queued.
    pub max_retries: usize,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            retry_interval: Duration::from_secs(1),
            max_retries: 0,
        }
    }
}

/// A held lock. Pass back to [`LockManager::release`] when done.
pub struct LockLease {
    key: String,
    token: String,
    strategy: LockStrategy,
    conn: Option<PoolConnection<Postgres>>,
}

impl LockLease {
    /// A lease with no backing connection (table, memory, and mock locks).
    pub fn detached(key: impl Into<String>, strategy: LockStrategy) -> Self {
        let key = key.into();
        let token = lease_token(&key, strategy);
        Self {
            key,
            token,
            strategy,
            conn: None,
        }
    }

    fn advisory(key: String, conn: PoolConnection<Postgres>) -> Self {
        let token = lease_token(&key, LockStrategy::Advisory);
        Self {
            key,
            token,
            strategy: LockStrategy::Advisory,
            conn: Some(conn),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn strategy(&self) -> LockStrategy {
        self.strategy
    }
}

impl std::fmt::Debug for LockLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockLease")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Outcome of an acquisition attempt.
#[derive(Debug)]
pub enum LockAcquire {
    Acquired(LockLease),
    /// Held by another process; not an error, a skip.
    Busy,
}

/// Errors while talking to the lock backend.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock already held by another process")]
    Busy,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Interface for distributed lock acquisition.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Try to acquire the named lock. Never blocks beyond the configured
    /// retry policy.
    async fn acquire(&self, key: &str, options: &LockOptions) -> Result<LockAcquire, LockError>;

    /// Best-effort release. Failures are logged and swallowed.
    async fn release(&self, lease: LockLease);
}

/// PostgreSQL-backed lock manager with the cascading fallback strategy.
pub struct PgLockManager {
    pool: PgPool,
}

impl PgLockManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stable signed 64-bit advisory key for a lock key string.
    pub fn advisory_key(key: &str) -> i64 {
        let digest = Sha256::digest(key.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        i64::from_be_bytes(bytes)
    }

    async fn try_once(&self, key: &str, options: &LockOptions) -> Result<LockAcquire, LockError> {
        match self.try_advisory(key).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if advisory_unavailable(&err) => {
                warn!(
                    key,
                    error = %err,
                    "advisory locks unavailable, falling back to table-based lock"
                );
                self.try_table(key, options.timeout).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn try_advisory(&self, key: &str) -> Result<LockAcquire, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let row: PgRow = sqlx::query("SELECT pg_try_advisory_lock($1) AS acquired")
            .bind(Self::advisory_key(key))
            .fetch_one(&mut *conn)
            .await?;
        let acquired: bool = row.try_get("acquired")?;

        if acquired {
            debug!(key, "acquired advisory lock");
            Ok(LockAcquire::Acquired(LockLease::advisory(
                key.to_string(),
                conn,
            )))
        } else {
            Ok(LockAcquire::Busy)
        }
    }

    async fn try_table(&self, key: &str, ttl: Duration) -> Result<LockAcquire, LockError> {
        let mut tx = self.pool.begin().await?;

        let select = Query::select()
            .column(JobLock::ExpiresAt)
            .from(JobLock::Table)
            .and_where(Expr::col(JobLock::LockKey).eq(key))
            .lock_with_behavior(sea_query::LockType::Update, sea_query::LockBehavior::Nowait)
            .to_string(PostgresQueryBuilder);

        match sqlx::query(&select).fetch_optional(&mut *tx).await {
            Ok(Some(row)) => {
                let expires_at: chrono::DateTime<Utc> = row.try_get("expires_at")?;
                if !lock_row_expired(expires_at, Utc::now()) {
                    // Live lock; the dropped transaction rolls back.
                    return Ok(LockAcquire::Busy);
                }
                let delete = Query::delete()
                    .from_table(JobLock::Table)
                    .and_where(Expr::col(JobLock::LockKey).eq(key))
                    .to_string(PostgresQueryBuilder);
                sqlx::query(&delete).execute(&mut *tx).await?;
                debug!(key, "reclaimed expired table lock");
            }
            Ok(None) => {}
            Err(err) if row_locked(&err) => return Ok(LockAcquire::Busy),
            Err(err) if undefined_table(&err) => {
                warn!(
                    key,
                    "job_lock table missing; degrading to in-process lock with NO \
                     cross-process exclusion"
                );
                return Ok(LockAcquire::Acquired(LockLease::detached(
                    key,
                    LockStrategy::Memory,
                )));
            }
            Err(err) => return Err(err.into()),
        }

        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(3600));
        let insert = Query::insert()
            .into_table(JobLock::Table)
            .columns([JobLock::LockKey, JobLock::AcquiredAt, JobLock::ExpiresAt])
            .values_panic([
                key.into(),
                Utc::now().to_rfc3339().into(),
                expires_at.to_rfc3339().into(),
            ])
            .to_string(PostgresQueryBuilder);
        sqlx::query(&insert).execute(&mut *tx).await?;
        tx.commit().await?;

        warn!(key, "acquired table-based lock (advisory locks unavailable)");
        Ok(LockAcquire::Acquired(LockLease::detached(
            key,
            LockStrategy::Table,
        )))
    }
}

#[async_trait]
impl LockManager for PgLockManager {
    async fn acquire(&self, key: &str, options: &LockOptions) -> Result<LockAcquire, LockError> {
        let policy = ConstantBuilder::default()
            .with_delay(options.retry_interval)
            .with_max_times(options.max_retries);

        let attempt = || async {
            match self.try_once(key, options).await? {
                LockAcquire::Acquired(lease) => Ok(lease),
                LockAcquire::Busy => Err(LockError::Busy),
            }
        };

        match attempt
            .retry(policy)
            .when(|err| matches!(err, LockError::Busy))
            .await
        {
            Ok(lease) => Ok(LockAcquire::Acquired(lease)),
            Err(LockError::Busy) => Ok(LockAcquire::Busy),
            Err(err) => Err(err),
        }
    }

    async fn release(&self, lease: LockLease) {
        match lease.strategy {
            LockStrategy::Advisory => {
                let key = Self::advisory_key(&lease.key);
                if let Some(mut conn) = lease.conn {
                    let result = sqlx::query("SELECT pg_advisory_unlock($1)")
                        .bind(key)
                        .execute(&mut *conn)
                        .await;
                    if let Err(err) = result {
                        warn!(key = %lease.key, error = %err, "failed to release advisory lock");
                    }
                } else {
                    // Lease was constructed detached; connection teardown
                    // will drop the server-side lock.
                    warn!(key = %lease.key, "advisory lease without connection, relying on teardown");
                }
            }
            LockStrategy::Table => {
                let delete = Query::delete()
                    .from_table(JobLock::Table)
                    .and_where(Expr::col(JobLock::LockKey).eq(lease.key.as_str()))
                    .to_string(PostgresQueryBuilder);
                if let Err(err) = sqlx::query(&delete).execute(&self.pool).await {
                    warn!(key = %lease.key, error = %err, "failed to release table lock");
                }
            }
            LockStrategy::Memory => {}
        }
    }
}

/// An abandoned row is reclaimable once its expiry has passed.
fn lock_row_expired(expires_at: chrono::DateTime<Utc>, now: chrono::DateTime<Utc>) -> bool {
    expires_at <= now
}

fn advisory_unavailable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            advisory_unavailable_message(&db.message().to_ascii_lowercase())
        }
        _ => false,
    }
}

/// The advisory primitive is missing or disabled when the server's error
/// message names it. Expects a lowercased message.
fn advisory_unavailable_message(message: &str) -> bool {
    message.contains("pg_try_advisory_lock") || message.contains("advisory")
}

fn pg_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// `lock_not_available`: another transaction holds the row lock.
fn row_locked(err: &sqlx::Error) -> bool {
    pg_code(err).as_deref().is_some_and(row_locked_code)
}

fn row_locked_code(code: &str) -> bool {
    code == "55P03"
}

/// `undefined_table`: the fallback table has not been provisioned.
fn undefined_table(err: &sqlx::Error) -> bool {
    pg_code(err).as_deref().is_some_and(undefined_table_code)
}

fn undefined_table_code(code: &str) -> bool {
    code == "42P01"
}

fn lease_token(key: &str, strategy: LockStrategy) -> String {
    let prefix = match strategy {
        LockStrategy::Advisory => "adv",
        LockStrategy::Table => "tbl",
        LockStrategy::Memory => "mem",
    };
    format!("{prefix}_{:016x}", PgLockManager::advisory_key(key) as u64)
}
