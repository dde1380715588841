//! Job runner harness.
//!
//! `run` acquires the job lock with zero retries, writes a `Running` audit
//! row, races the unit of work against a timeout, writes the terminal row,
//! alerts on failure, and releases the lock unconditionally.
//!
//! The timeout race uses `tokio::time::timeout`, which *drops* the losing
//! future: abandonment is real cancellation of in-flight work, so a second
//! run cannot overlap with a timed-out first run's tail writes.
//!
//! A panic inside the unit of work is caught and recorded as a failed run;
//! it never unwinds past the terminal audit row or the lock release.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::interfaces::{JobStatus, RunLogStore, StorageError};
use crate::lock::{LockAcquire, LockLease, LockManager, LockOptions};

use super::alerts::{JobAlerter, JobFailureAlert};

/// Errors surfaced by a unit of work.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{0}")]
    Work(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl JobError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Work(message.into())
    }
}

/// What a unit of work hands back: a value plus any sub-step errors it chose
/// to survive. Non-empty errors map to [`JobStatus::Partial`] with the
/// successful sub-steps' effects kept.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport<T> {
    pub value: T,
    pub errors: Vec<String>,
}

impl<T> JobReport<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            errors: Vec::new(),
        }
    }

    pub fn partial(value: T, errors: Vec<String>) -> Self {
        Self { value, errors }
    }
}

/// Options for one harnessed run.
#[derive(Debug, Clone)]
pub struct JobRunOptions {
    pub job_name: String,
    /// Unique key for this occurrence, e.g. `INCENTIVE_DAILY:2025-12-15`.
    pub job_key: String,
    pub timeout: Duration,
    /// Skip lock acquisition (tests and manual re-runs that bring their own
    /// exclusion).
    pub skip_lock: bool,
}

impl JobRunOptions {
    pub fn new(job_name: impl Into<String>, job_key: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            job_key: job_key.into(),
            timeout: Duration::from_secs(3600),
            skip_lock: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn without_lock(mut self) -> Self {
        self.skip_lock = true;
        self
    }
}

/// Structured result handed back to the scheduler. Raw errors never escape
/// the harness.
#[derive(Debug)]
pub struct JobOutcome<T> {
    pub success: bool,
    pub result: Option<T>,
    pub error: Option<String>,
    /// Absent when the run was skipped because the lock was held, or when
    /// even the audit row could not be written.
    pub run_log_id: Option<i64>,
    pub duration: Duration,
}

impl<T> JobOutcome<T> {
    fn skipped(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            run_log_id: None,
            duration,
        }
    }
}

/// Composes locking, run logging, timeout enforcement, and alerting around a
/// unit of work.
pub struct JobRunner {
    locks: Arc<dyn LockManager>,
    run_log: Arc<dyn RunLogStore>,
    alerts: Arc<dyn JobAlerter>,
    lock_options: LockOptions,
}

impl JobRunner {
    pub fn new(
        locks: Arc<dyn LockManager>,
        run_log: Arc<dyn RunLogStore>,
        alerts: Arc<dyn JobAlerter>,
    ) -> Self {
        Self {
            locks,
            run_log,
            alerts,
            lock_options: LockOptions::default(),
        }
    }

    /// Override the lock policy (expiry, retry interval). The lock expiry
    /// doubles as the default work timeout.
    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = lock_options;
        self
    }

    /// The configured wall-clock budget for one run.
    pub fn job_timeout(&self) -> Duration {
        self.lock_options.timeout
    }

    /// Run a unit of work under concurrency control.
    ///
    /// A held lock is a skip, not an error: no audit row is written, and the
    /// outcome distinguishes it from a failure by the absent `run_log_id`.
    pub async fn run<T, F, Fut>(&self, options: JobRunOptions, work: F) -> JobOutcome<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<JobReport<T>, JobError>> + Send,
    {
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut lease: Option<LockLease> = None;
        if !options.skip_lock {
            let lock_key = format!("job:{}", options.job_key);
            // Overlapping runs skip instead of queueing.
            let lock_options = LockOptions {
                timeout: options.timeout,
                max_retries: 0,
                ..self.lock_options.clone()
            };
            match self.locks.acquire(&lock_key, &lock_options).await {
                Ok(LockAcquire::Acquired(acquired)) => lease = Some(acquired),
                Ok(LockAcquire::Busy) => {
                    info!(
                        job_name = %options.job_name,
                        job_key = %options.job_key,
                        "job already running, skipping"
                    );
                    return JobOutcome::skipped(
                        "job already running (lock held)",
                        clock.elapsed(),
                    );
                }
                Err(err) => {
                    warn!(
                        job_name = %options.job_name,
                        job_key = %options.job_key,
                        error = %err,
                        "failed to acquire job lock, skipping run"
                    );
                    return JobOutcome::skipped(err.to_string(), clock.elapsed());
                }
            }
        }

        let outcome = self.run_locked(&options, started_at, clock, work).await;

        if let Some(lease) = lease {
            self.locks.release(lease).await;
        }

        outcome
    }

    async fn run_locked<T, F, Fut>(
        &self,
        options: &JobRunOptions,
        started_at: DateTime<Utc>,
        clock: Instant,
        work: F,
    ) -> JobOutcome<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<JobReport<T>, JobError>> + Send,
    {
        let stats = json!({ "jobKey": options.job_key });
        let run_log_id = match self
            .run_log
            .create_running(&options.job_name, &options.job_key, started_at, &stats)
            .await
        {
            Ok(id) => id,
            Err(err) => {
                // Nothing ran yet; audit the failure with a terminal row and
                // bail before touching the unit of work.
                error!(
                    job_name = %options.job_name,
                    job_key = %options.job_key,
                    error = %err,
                    "failed to create job run log"
                );
                return self
                    .fail(options, started_at, clock, None, err.to_string())
                    .await;
            }
        };

        info!(
            job_name = %options.job_name,
            job_key = %options.job_key,
            run_log_id,
            "job started"
        );

        let work = AssertUnwindSafe(work()).catch_unwind();
        match tokio::time::timeout(options.timeout, work).await {
            Ok(Ok(Ok(report))) => {
                self.finish(options, clock, run_log_id, report).await
            }
            Ok(Ok(Err(err))) => {
                self.fail(options, started_at, clock, Some(run_log_id), err.to_string())
                    .await
            }
            Ok(Err(panic)) => {
                // The unwinding stops here so the terminal row and the lock
                // release in `run` still happen.
                let message = format!(
                    "job {} panicked: {}",
                    options.job_name,
                    panic_message(panic.as_ref())
                );
                self.fail(options, started_at, clock, Some(run_log_id), message)
                    .await
            }
            Err(_elapsed) => {
                // The work future has been dropped; its in-flight storage
                // calls are cancelled with it.
                let message = format!(
                    "job {} timed out after {}ms",
                    options.job_name,
                    options.timeout.as_millis()
                );
                self.fail(options, started_at, clock, Some(run_log_id), message)
                    .await
            }
        }
    }

    async fn finish<T: Serialize>(
        &self,
        options: &JobRunOptions,
        clock: Instant,
        run_log_id: i64,
        report: JobReport<T>,
    ) -> JobOutcome<T> {
        let ended_at = Utc::now();
        let duration = clock.elapsed();
        let status = if report.errors.is_empty() {
            JobStatus::Success
        } else {
            JobStatus::Partial
        };
        let error = if report.errors.is_empty() {
            None
        } else {
            Some(report.errors.join("; "))
        };

        let stats = json!({
            "jobKey": options.job_key,
            "durationMs": duration.as_millis() as u64,
            "result": serde_json::to_value(&report.value).unwrap_or(serde_json::Value::Null),
            "errors": report.errors,
        });

        if let Err(err) = self
            .run_log
            .mark_finished(run_log_id, status, ended_at, &stats, error.as_deref())
            .await
        {
            error!(
                job_name = %options.job_name,
                run_log_id,
                error = %err,
                "failed to update job run log"
            );
        }

        if let Some(message) = &error {
            warn!(
                job_name = %options.job_name,
                job_key = %options.job_key,
                run_log_id,
                error = %message,
                "job completed partially"
            );
            self.alerts
                .alert_failure(JobFailureAlert {
                    job_name: options.job_name.clone(),
                    job_key: options.job_key.clone(),
                    error: message.clone(),
                    duration_ms: duration.as_millis() as u64,
                })
                .await;
        } else {
            info!(
                job_name = %options.job_name,
                job_key = %options.job_key,
                run_log_id,
                duration_ms = duration.as_millis() as u64,
                "job completed"
            );
        }

        JobOutcome {
            success: true,
            result: Some(report.value),
            error,
            run_log_id: Some(run_log_id),
            duration,
        }
    }

    async fn fail<T>(
        &self,
        options: &JobRunOptions,
        started_at: DateTime<Utc>,
        clock: Instant,
        run_log_id: Option<i64>,
        message: String,
    ) -> JobOutcome<T> {
        let ended_at = Utc::now();
        let duration = clock.elapsed();

        error!(
            job_name = %options.job_name,
            job_key = %options.job_key,
            error = %message,
            "job failed"
        );

        let stats = json!({
            "jobKey": options.job_key,
            "durationMs": duration.as_millis() as u64,
            "error": message,
        });

        let run_log_id = match run_log_id {
            Some(id) => {
                if let Err(err) = self
                    .run_log
                    .mark_finished(id, JobStatus::Error, ended_at, &stats, Some(&message))
                    .await
                {
                    error!(run_log_id = id, error = %err, "failed to update job run log");
                }
                Some(id)
            }
            None => match self
                .run_log
                .insert_finished(
                    &options.job_name,
                    &options.job_key,
                    JobStatus::Error,
                    started_at,
                    ended_at,
                    &stats,
                    Some(&message),
                )
                .await
            {
                Ok(id) => Some(id),
                Err(err) => {
                    error!(error = %err, "failed to record failed job run");
                    None
                }
            },
        };

        self.alerts
            .alert_failure(JobFailureAlert {
                job_name: options.job_name.clone(),
                job_key: options.job_key.clone(),
                error: message.clone(),
                duration_ms: duration.as_millis() as u64,
            })
            .await;

        JobOutcome {
            success: false,
            result: None,
            error: Some(message),
            run_log_id,
            duration,
        }
    }

    /// Weak liveness probe over recent `Running` audit rows. The lock, not
    /// this probe, is the correctness mechanism.
    pub async fn is_job_running(&self, job_name: &str) -> bool {
        let since = Utc::now() - chrono::Duration::hours(1);
        matches!(
            self.run_log.latest_running(job_name, since).await,
            Ok(Some(_))
        )
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
