//! PostgreSQL-backed job run audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Order, PostgresQueryBuilder, Query};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::interfaces::{JobRunRecord, JobStatus, Result, RunLogStore, StorageError};
use crate::storage::schema::JobRunLog;

pub struct PgRunLogStore {
    pool: PgPool,
}

impl PgRunLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> Result<JobRunRecord> {
        let status: String = row.try_get("status")?;
        let status = JobStatus::parse(&status)
            .ok_or_else(|| StorageError::Invalid(format!("unknown job status: {status}")))?;
        Ok(JobRunRecord {
            id: row.try_get("id")?,
            job_name: row.try_get("job_name")?,
            job_key: row.try_get("job_key")?,
            status,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            stats: row.try_get("stats")?,
            error: row.try_get("error")?,
        })
    }
}

#[async_trait]
impl RunLogStore for PgRunLogStore {
    async fn create_running(
        &self,
        job_name: &str,
        job_key: &str,
        started_at: DateTime<Utc>,
        stats: &serde_json::Value,
    ) -> Result<i64> {
        let sql = Query::insert()
            .into_table(JobRunLog::Table)
            .columns([
                JobRunLog::JobName,
                JobRunLog::JobKey,
                JobRunLog::Status,
                JobRunLog::StartedAt,
                JobRunLog::Stats,
            ])
            .values_panic([
                job_name.into(),
                job_key.into(),
                JobStatus::Running.as_str().into(),
                started_at.to_rfc3339().into(),
                stats.to_string().into(),
            ])
            .returning_col(JobRunLog::Id)
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(row.try_get("id")?)
    }

    async fn mark_finished(
        &self,
        id: i64,
        status: JobStatus,
        ended_at: DateTime<Utc>,
        stats: &serde_json::Value,
        error: Option<&str>,
    ) -> Result<()> {
        let sql = {
            let mut update = Query::update();
            update
                .table(JobRunLog::Table)
                .value(JobRunLog::Status, status.as_str())
                .value(JobRunLog::EndedAt, ended_at.to_rfc3339())
                .value(JobRunLog::Stats, stats.to_string())
                .and_where(Expr::col(JobRunLog::Id).eq(id));
            if let Some(error) = error {
                update.value(JobRunLog::Error, error);
            }
            update.to_string(PostgresQueryBuilder)
        };
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_finished(
        &self,
        job_name: &str,
        job_key: &str,
        status: JobStatus,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        stats: &serde_json::Value,
        error: Option<&str>,
    ) -> Result<i64> {
        let sql = Query::insert()
            .into_table(JobRunLog::Table)
            .columns([
                JobRunLog::JobName,
                JobRunLog::JobKey,
                JobRunLog::Status,
                JobRunLog::StartedAt,
                JobRunLog::EndedAt,
                JobRunLog::Stats,
                JobRunLog::Error,
            ])
            .values_panic([
                job_name.into(),
                job_key.into(),
                status.as_str().into(),
                started_at.to_rfc3339().into(),
                ended_at.to_rfc3339().into(),
                stats.to_string().into(),
                error.map(str::to_string).into(),
            ])
            .returning_col(JobRunLog::Id)
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(row.try_get("id")?)
    }

    async fn latest_running(
        &self,
        job_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<JobRunRecord>> {
        let sql = Query::select()
            .columns([
                JobRunLog::Id,
                JobRunLog::JobName,
                JobRunLog::JobKey,
                JobRunLog::Status,
                JobRunLog::StartedAt,
                JobRunLog::EndedAt,
                JobRunLog::Stats,
                JobRunLog::Error,
            ])
            .from(JobRunLog::Table)
            .and_where(Expr::col(JobRunLog::JobName).eq(job_name))
            .and_where(Expr::col(JobRunLog::Status).eq(JobStatus::Running.as_str()))
            .and_where(Expr::col(JobRunLog::StartedAt).gte(since.to_rfc3339()))
            .order_by(JobRunLog::StartedAt, Order::Desc)
            .limit(1)
            .to_string(PostgresQueryBuilder);

        match sqlx::query(&sql).fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn get(&self, id: i64) -> Result<Option<JobRunRecord>> {
        let sql = Query::select()
            .columns([
                JobRunLog::Id,
                JobRunLog::JobName,
                JobRunLog::JobKey,
                JobRunLog::Status,
                JobRunLog::StartedAt,
                JobRunLog::EndedAt,
                JobRunLog::Stats,
                JobRunLog::Error,
            ])
            .from(JobRunLog::Table)
            .and_where(Expr::col(JobRunLog::Id).eq(id))
            .to_string(PostgresQueryBuilder);

        match sqlx::query(&sql).fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }
}
