//! Storage interfaces.
//!
//! Every persistence seam is an `async_trait` behind which the PostgreSQL
//! implementations (`crate::storage::postgres`) and the in-memory test
//! doubles (`crate::storage::mock`) live. The engine itself never touches a
//! pool directly; it is handed trait objects at construction time.

mod ledger;
mod metric_source;
mod plan;
mod run_log;

pub use ledger::{Breakdown, BreakdownRule, LedgerEntry, LedgerStore, NewLedgerEntry};
pub use metric_source::{
    CallLogRow, LoadRow, LoadStatus, MetricSource, RateAverages, ReviewResponseRow,
};
pub use plan::{MembershipStore, Plan, PlanStore, Venture};
pub use run_log::{JobRunRecord, JobStatus, RunLogStore};

/// Identifier of a user (store-assigned).
pub type UserId = i64;
/// Identifier of a venture.
pub type VentureId = i64;
/// Identifier of a compensation plan.
pub type PlanId = i64;
/// Identifier of an incentive rule.
pub type RuleId = i64;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Row not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid stored value: {0}")]
    Invalid(String),
}
