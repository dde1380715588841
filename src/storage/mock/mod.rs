//! In-memory test doubles for the storage interfaces.
//!
//! Each mock mirrors the observable behavior of its PostgreSQL counterpart
//! and adds introspection hooks (query counters, failure injection) that the
//! unit tests drive.

mod ledger_store;
mod lock_manager;
mod metric_source;
mod plan_store;
mod run_log_store;

pub use ledger_store::MockLedgerStore;
pub use lock_manager::MockLockManager;
pub use metric_source::MockMetricSource;
pub use plan_store::{MockMembershipStore, MockPlanStore};
pub use run_log_store::MockRunLogStore;
