//! Job run audit log interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Result;

/// Terminal and non-terminal job run states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Success,
    Error,
    /// A multi-step job where some sub-steps failed and the successful
    /// sub-steps' effects were kept.
    Partial,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::Partial => "PARTIAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "ERROR" => Some(Self::Error),
            "PARTIAL" => Some(Self::Partial),
            _ => None,
        }
    }
}

/// One audited job run. Created at lock acquisition in `Running` state and
/// updated exactly once at terminal state. Doubles as a weak liveness probe
/// for "is this job currently running".
#[derive(Debug, Clone, PartialEq)]
pub struct JobRunRecord {
    pub id: i64,
    pub job_name: String,
    pub job_key: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub stats: serde_json::Value,
    pub error: Option<String>,
}

/// Interface for job run log persistence.
#[async_trait]
pub trait RunLogStore: Send + Sync {
    /// Insert a `Running` row, returning its id.
    async fn create_running(
        &self,
        job_name: &str,
        job_key: &str,
        started_at: DateTime<Utc>,
        stats: &serde_json::Value,
    ) -> Result<i64>;

    /// Move a row to a terminal state.
    async fn mark_finished(
        &self,
        id: i64,
        status: JobStatus,
        ended_at: DateTime<Utc>,
        stats: &serde_json::Value,
        error: Option<&str>,
    ) -> Result<()>;

    /// Insert an already-terminal row (used when a run fails before its
    /// `Running` row could be created).
    #[allow(clippy::too_many_arguments)]
    async fn insert_finished(
        &self,
        job_name: &str,
        job_key: &str,
        status: JobStatus,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        stats: &serde_json::Value,
        error: Option<&str>,
    ) -> Result<i64>;

    /// Most recent `Running` row for a job started at or after `since`.
    async fn latest_running(
        &self,
        job_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<JobRunRecord>>;

    /// Fetch one record by id.
    async fn get(&self, id: i64) -> Result<Option<JobRunRecord>>;
}
