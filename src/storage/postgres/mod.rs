//! PostgreSQL implementations of the storage interfaces.

mod ledger_store;
mod metric_source;
mod plan_store;
mod run_log_store;

pub use ledger_store::PgLedgerStore;
pub use metric_source::PgMetricSource;
pub use plan_store::{PgMembershipStore, PgPlanStore};
pub use run_log_store::PgRunLogStore;
