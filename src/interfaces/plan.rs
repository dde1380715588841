//! Venture, plan, and membership read interfaces.

use async_trait::async_trait;

use crate::rules::IncentiveRule;

use super::{PlanId, Result, UserId, VentureId};

/// An independently operated business unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Venture {
    pub id: VentureId,
    pub name: String,
}

/// A named collection of compensation rules scoped to one venture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub id: PlanId,
    pub venture_id: VentureId,
    pub name: String,
}

/// Interface to venture / plan / rule definitions. Rules are read, never
/// mutated, by this subsystem.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// All active ventures.
    async fn active_ventures(&self) -> Result<Vec<Venture>>;

    /// One active venture by id.
    async fn venture(&self, venture_id: VentureId) -> Result<Option<Venture>>;

    /// Active plans for a venture.
    async fn active_plans(&self, venture_id: VentureId) -> Result<Vec<Plan>>;

    /// One plan by id.
    async fn plan(&self, plan_id: PlanId) -> Result<Option<Plan>>;

    /// Enabled rules for a plan.
    async fn enabled_rules(&self, plan_id: PlanId) -> Result<Vec<IncentiveRule>>;
}

/// Interface to formal venture membership.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Users formally attached to the venture. The committer unions these
    /// with metric-bearing users, so membership is not a payment gate.
    async fn member_user_ids(&self, venture_id: VentureId) -> Result<Vec<UserId>>;
}
