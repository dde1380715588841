//! In-memory job run audit log.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::interfaces::{JobRunRecord, JobStatus, Result, RunLogStore, StorageError};

#[derive(Default)]
pub struct MockRunLogStore {
    records: RwLock<Vec<JobRunRecord>>,
    next_id: AtomicI64,
    fail_create: AtomicBool,
}

impl MockRunLogStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            fail_create: AtomicBool::new(false),
        }
    }

    /// Snapshot of every stored record.
    pub async fn records(&self) -> Vec<JobRunRecord> {
        self.records.read().await.clone()
    }

    /// Make `create_running` fail.
    pub fn set_fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RunLogStore for MockRunLogStore {
    async fn create_running(
        &self,
        job_name: &str,
        job_key: &str,
        started_at: DateTime<Utc>,
        stats: &serde_json::Value,
    ) -> Result<i64> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StorageError::NotFound("job_run_log".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records.write().await.push(JobRunRecord {
            id,
            job_name: job_name.to_string(),
            job_key: job_key.to_string(),
            status: JobStatus::Running,
            started_at,
            ended_at: None,
            stats: stats.clone(),
            error: None,
        });
        Ok(id)
    }

    async fn mark_finished(
        &self,
        id: i64,
        status: JobStatus,
        ended_at: DateTime<Utc>,
        stats: &serde_json::Value,
        error: Option<&str>,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("job run {id}")))?;
        record.status = status;
        record.ended_at = Some(ended_at);
        record.stats = stats.clone();
        if let Some(error) = error {
            record.error = Some(error.to_string());
        }
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
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records.write().await.push(JobRunRecord {
            id,
            job_name: job_name.to_string(),
            job_key: job_key.to_string(),
            status,
            started_at,
            ended_at: Some(ended_at),
            stats: stats.clone(),
            error: error.map(str::to_string),
        });
        Ok(id)
    }

    async fn latest_running(
        &self,
        job_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<JobRunRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| {
                r.job_name == job_name && r.status == JobStatus::Running && r.started_at >= since
            })
            .max_by_key(|r| r.started_at)
            .cloned())
    }

    async fn get(&self, id: i64) -> Result<Option<JobRunRecord>> {
        Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
    }
}
