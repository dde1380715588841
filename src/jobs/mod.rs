//! Background job execution.
//!
//! The runner harness composes the distributed lock, run logging, a timeout
//! race, and failure alerting around a caller-supplied unit of work. The
//! wall-clock scheduler that decides *when* to invoke a job lives outside
//! this crate; the harness only serializes concurrent attempts at the same
//! occurrence.

pub mod alerts;
pub mod incentive_daily;
mod runner;

pub use alerts::{JobAlerter, JobFailureAlert, NoopAlerter, WebhookAlerter};
pub use incentive_daily::{
    IncentiveDailyJob, IncentiveDailyOptions, IncentiveDailyStats, INCENTIVE_DAILY_JOB,
};
pub use runner::{JobError, JobOutcome, JobReport, JobRunOptions, JobRunner};

#[cfg(test)]
mod tests;
