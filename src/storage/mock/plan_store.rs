//! In-memory venture / plan / rule definitions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::interfaces::{
    MembershipStore, Plan, PlanId, PlanStore, Result, StorageError, UserId, Venture, VentureId,
};
use crate::rules::IncentiveRule;

#[derive(Default)]
pub struct MockPlanStore {
    ventures: RwLock<Vec<Venture>>,
    plans: RwLock<Vec<Plan>>,
    rules: RwLock<Vec<IncentiveRule>>,
    fail_ventures: AtomicBool,
}

impl MockPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_venture(&self, id: VentureId, name: &str) {
        self.ventures.write().await.push(Venture {
            id,
            name: name.to_string(),
        });
    }

    pub async fn add_plan(&self, id: PlanId, venture_id: VentureId, name: &str) {
        self.plans.write().await.push(Plan {
            id,
            venture_id,
            name: name.to_string(),
        });
    }

    pub async fn add_rule(&self, rule: IncentiveRule) {
        self.rules.write().await.push(rule);
    }

    /// Make venture listing fail.
    pub fn set_fail_ventures(&self) {
        self.fail_ventures.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlanStore for MockPlanStore {
    async fn active_ventures(&self) -> Result<Vec<Venture>> {
        if self.fail_ventures.load(Ordering::SeqCst) {
            return Err(StorageError::NotFound("ventures".to_string()));
        }
        Ok(self.ventures.read().await.clone())
    }

    async fn venture(&self, venture_id: VentureId) -> Result<Option<Venture>> {
        if self.fail_ventures.load(Ordering::SeqCst) {
            return Err(StorageError::NotFound("ventures".to_string()));
        }
        Ok(self
            .ventures
            .read()
            .await
            .iter()
            .find(|v| v.id == venture_id)
            .cloned())
    }

    async fn active_plans(&self, venture_id: VentureId) -> Result<Vec<Plan>> {
        Ok(self
            .plans
            .read()
            .await
            .iter()
            .filter(|p| p.venture_id == venture_id)
            .cloned()
            .collect())
    }

    async fn plan(&self, plan_id: PlanId) -> Result<Option<Plan>> {
        Ok(self.plans.read().await.iter().find(|p| p.id == plan_id).cloned())
    }

    async fn enabled_rules(&self, plan_id: PlanId) -> Result<Vec<IncentiveRule>> {
        Ok(self
            .rules
            .read()
            .await
            .iter()
            .filter(|r| r.plan_id == plan_id && r.is_enabled)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MockMembershipStore {
    members: RwLock<HashMap<VentureId, Vec<UserId>>>,
}

impl MockMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_member(&self, venture_id: VentureId, user_id: UserId) {
        self.members
            .write()
            .await
            .entry(venture_id)
            .or_default()
            .push(user_id);
    }
}

#[async_trait]
impl MembershipStore for MockMembershipStore {
    async fn member_user_ids(&self, venture_id: VentureId) -> Result<Vec<UserId>> {
        Ok(self
            .members
            .read()
            .await
            .get(&venture_id)
            .cloned()
            .unwrap_or_default())
    }
}
