//! Read-only queries against the operational domains.
//!
//! Implementations return raw row structs; the aggregation semantics live in
//! pure fold functions under `crate::metrics` so they can be tested without a
//! database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Result, UserId, VentureId};

/// Freight load lifecycle status. Only `Delivered` loads ever contribute to
/// freight metrics; `Covered` and `Lost` must not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Delivered,
    Covered,
    Lost,
    Other(String),
}

impl LoadStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "DELIVERED" => Self::Delivered,
            "COVERED" => Self::Covered,
            "LOST" => Self::Lost,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Delivered => "DELIVERED",
            Self::Covered => "COVERED",
            Self::Lost => "LOST",
            Self::Other(s) => s,
        }
    }
}

/// One freight load billed inside the queried range.
#[derive(Debug, Clone)]
pub struct LoadRow {
    /// User who booked the load; unattributed loads count toward no one.
    pub created_by: Option<UserId>,
    pub status: LoadStatus,
    pub bill_amount: Option<f64>,
    pub miles: Option<f64>,
    pub margin_amount: Option<f64>,
}

/// One call-center log, already joined to the agent's backing user.
#[derive(Debug, Clone)]
pub struct CallLogRow {
    /// User backing the originating agent record; logs whose agent has no
    /// user are dropped.
    pub user_id: Option<UserId>,
    pub dial_count: Option<i64>,
    pub connected: bool,
    pub deal_won: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One hotel review response event.
#[derive(Debug, Clone)]
pub struct ReviewResponseRow {
    pub responded_by: UserId,
}

/// Venture-level ADR / RevPAR averages over a period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateAverages {
    pub adr: f64,
    pub revpar: f64,
}

/// Interface to the three operational domains.
///
/// Each method is called only when at least one requested metric key belongs
/// to that domain. A failure in any one aborts the whole computation; there
/// is deliberately no per-domain isolation here.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Loads whose delivery billing date falls inside the range. Status
    /// filtering happens in the fold so the exclusion lives in one place.
    async fn freight_loads(
        &self,
        venture_id: VentureId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LoadRow>>;

    /// Call logs started inside the range, attributed to backing users.
    async fn call_logs(
        &self,
        venture_id: VentureId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CallLogRow>>;

    /// Review responses recorded inside the range for the venture's hotels.
    async fn review_responses(
        &self,
        venture_id: VentureId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ReviewResponseRow>>;

    /// Venture-level ADR / RevPAR averages over the range. Zero when no KPI
    /// rows exist.
    async fn hotel_rate_averages(
        &self,
        venture_id: VentureId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RateAverages>;
}
