//! Ledger persistence interface.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{PlanId, Result, RuleId, UserId, VentureId};

/// One contributing rule inside a ledger entry's breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownRule {
    pub rule_id: RuleId,
    /// Present in idempotent commits, absent in legacy additive rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,
    pub amount: f64,
}

/// The ordered list of contributions that produced a ledger entry's total.
///
/// Serialized to JSON in the `breakdown` column. Idempotent commits also
/// record every plan that participated and when the row was computed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Breakdown {
    pub rules: Vec<BreakdownRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_ids: Option<Vec<PlanId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_at: Option<DateTime<Utc>>,
}

/// A persisted per-user daily incentive row.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: UserId,
    pub venture_id: VentureId,
    pub day: NaiveDate,
    pub amount: f64,
    pub currency: String,
    pub breakdown: Breakdown,
}

/// A ledger row about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub user_id: UserId,
    pub venture_id: VentureId,
    pub day: NaiveDate,
    pub amount: f64,
    pub currency: String,
    pub breakdown: Breakdown,
}

/// Interface for incentive ledger persistence.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Look up the entry for one user in a `(venture, day)` scope.
    async fn find_entry(
        &self,
        user_id: UserId,
        venture_id: VentureId,
        day: NaiveDate,
    ) -> Result<Option<LedgerEntry>>;

    /// Insert a fresh entry, returning its id.
    async fn insert_entry(&self, entry: NewLedgerEntry) -> Result<i64>;

    /// Overwrite an existing entry's amount and breakdown.
    async fn update_entry(&self, id: i64, amount: f64, breakdown: &Breakdown) -> Result<()>;

    /// Delete every entry in a `(venture, day)` scope. Returns rows deleted.
    async fn delete_day(&self, venture_id: VentureId, day: NaiveDate) -> Result<u64>;

    /// Delete every entry in a `(venture, day)` scope and insert the
    /// replacements, in a single transaction. Returns `(deleted, inserted)`.
    ///
    /// The transaction keeps a concurrent reader from observing the window
    /// between the clear and the re-insert; the job lock keeps a concurrent
    /// writer out of the whole sequence.
    async fn replace_day(
        &self,
        venture_id: VentureId,
        day: NaiveDate,
        entries: Vec<NewLedgerEntry>,
    ) -> Result<(u64, u64)>;

    /// All entries in a `(venture, day)` scope, ordered by user id.
    async fn entries_for_day(
        &self,
        venture_id: VentureId,
        day: NaiveDate,
    ) -> Result<Vec<LedgerEntry>>;
}
