//! Tally - incentive computation and idempotent settlement.
//!
//! Periodically recomputes variable compensation for users across independent
//! business units ("ventures") from operational metrics, and commits the
//! results into a daily ledger that is safe to recompute any number of times.
//! A cascading distributed lock and a job-runner harness serialize concurrent
//! attempts at the same scheduled occurrence.

pub mod config;
pub mod interfaces;
pub mod jobs;
pub mod lock;
pub mod metrics;
pub mod rules;
pub mod settlement;
pub mod storage;
