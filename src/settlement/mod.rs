//! Settlement committer.
//!
//! Orchestrates metric aggregation and rule evaluation across all users and
//! rules for a `(venture, day)` scope and writes ledger rows. Two modes:
//!
//! - **Additive**: find-or-create per user, adding to existing amounts. Kept
//!   for legacy call sites; re-running it doubles amounts, so callers must
//!   track whether a day was already committed.
//! - **Idempotent**: delete every row in the scope and re-insert from a fresh
//!   computation across all active plans, inside one transaction. Safe to
//!   re-run any number of times; the default for scheduled invocation.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use crate::interfaces::{
    Breakdown, BreakdownRule, LedgerStore, MembershipStore, MetricSource, NewLedgerEntry, PlanId,
    PlanStore, Result, RuleId, UserId, VentureId,
};
use crate::metrics::{MetricAggregator, MetricKey};
use crate::rules::{self, IncentiveRule};

/// Ledger currency. Conversion is out of scope; everything settles in USD.
pub const LEDGER_CURRENCY: &str = "USD";

/// One non-zero rule outcome for one user. Ephemeral; aggregated into ledger
/// rows by the commit paths.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub user_id: UserId,
    pub rule_id: RuleId,
    pub plan_id: PlanId,
    pub amount: f64,
    pub day: NaiveDate,
}

/// Result of an additive commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdditiveOutcome {
    pub contributions: Vec<Contribution>,
    pub inserted: u64,
    pub updated: u64,
}

/// Result of an idempotent commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdempotentOutcome {
    pub contributions: Vec<Contribution>,
    pub deleted: u64,
    pub inserted: u64,
}

/// Computes incentives and commits them to the ledger.
pub struct SettlementCommitter {
    metrics: MetricAggregator,
    plans: Arc<dyn PlanStore>,
    members: Arc<dyn MembershipStore>,
    ledger: Arc<dyn LedgerStore>,
}

impl SettlementCommitter {
    pub fn new(
        source: Arc<dyn MetricSource>,
        plans: Arc<dyn PlanStore>,
        members: Arc<dyn MembershipStore>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Self {
        Self {
            metrics: MetricAggregator::new(source),
            plans,
            members,
            ledger,
        }
    }

    /// Compute contributions for one plan's rules over one calendar day.
    ///
    /// The in-scope user universe is the union of formal venture members and
    /// every user that carried a metric in the period; a metric-bearing user
    /// without formal membership is still paid. Zero and non-finite amounts
    /// are suppressed.
    pub async fn compute_day(
        &self,
        venture_id: VentureId,
        plan_id: PlanId,
        day: NaiveDate,
        rules: &[IncentiveRule],
        restrict_to: Option<&[UserId]>,
    ) -> Result<Vec<Contribution>> {
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let required: HashSet<MetricKey> = rules.iter().map(|r| r.metric_key).collect();
        let mut metric_set = self.metrics.collect(venture_id, day, &required).await?;

        let mut universe: BTreeSet<UserId> =
            self.members.member_user_ids(venture_id).await?.into_iter().collect();
        universe.extend(metric_set.user_ids());

        let mut contributions = Vec::new();
        for user_id in universe {
            if let Some(allowed) = restrict_to {
                if !allowed.contains(&user_id) {
                    continue;
                }
            }

            let bucket = metric_set.bucket(user_id);
            for rule in rules {
                let metric_value = Some(bucket.value(rule.metric_key));
                let amount = rules::evaluate(rule, metric_value, bucket);
                if !rules::is_payable(amount) {
                    continue;
                }
                contributions.push(Contribution {
                    user_id,
                    rule_id: rule.id,
                    plan_id,
                    amount,
                    day,
                });
            }
        }

        debug!(
            venture_id,
            plan_id,
            %day,
            contributions = contributions.len(),
            "computed incentive contributions"
        );
        Ok(contributions)
    }

    /// Compute contributions for a plan, resolving its venture and enabled
    /// rules. An unknown plan or an empty rule set yields no contributions.
    pub async fn compute_plan_day(
        &self,
        plan_id: PlanId,
        day: NaiveDate,
        restrict_to: Option<&[UserId]>,
    ) -> Result<Vec<Contribution>> {
        let Some(plan) = self.plans.plan(plan_id).await? else {
            return Ok(Vec::new());
        };
        let rules = self.plans.enabled_rules(plan_id).await?;
        self.compute_day(plan.venture_id, plan_id, day, &rules, restrict_to)
            .await
    }

    /// Additive commit for one plan and day.
    ///
    /// NOT safe to re-run blindly: each run adds on top of existing rows.
    pub async fn commit_additive(&self, plan_id: PlanId, day: NaiveDate) -> Result<AdditiveOutcome> {
        let Some(plan) = self.plans.plan(plan_id).await? else {
            return Ok(AdditiveOutcome::default());
        };

        let contributions = self.compute_plan_day(plan_id, day, None).await?;
        let mut inserted = 0;
        let mut updated = 0;

        for c in &contributions {
            match self.ledger.find_entry(c.user_id, plan.venture_id, day).await? {
                None => {
                    self.ledger
                        .insert_entry(NewLedgerEntry {
                            user_id: c.user_id,
                            venture_id: plan.venture_id,
                            day,
                            amount: c.amount,
                            currency: LEDGER_CURRENCY.to_string(),
                            breakdown: Breakdown {
                                rules: vec![BreakdownRule {
                                    rule_id: c.rule_id,
                                    plan_id: None,
                                    amount: c.amount,
                                }],
                                ..Default::default()
                            },
                        })
                        .await?;
                    inserted += 1;
                }
                Some(existing) => {
                    let mut breakdown = existing.breakdown;
                    breakdown.rules.push(BreakdownRule {
                        rule_id: c.rule_id,
                        plan_id: None,
                        amount: c.amount,
                    });
                    self.ledger
                        .update_entry(existing.id, existing.amount + c.amount, &breakdown)
                        .await?;
                    updated += 1;
                }
            }
        }

        info!(plan_id, %day, inserted, updated, "additive incentive commit");
        Ok(AdditiveOutcome {
            contributions,
            inserted,
            updated,
        })
    }

    /// Idempotent commit for a venture and day across all given plans.
    ///
    /// Every plan is computed first, then the whole `(venture, day)` scope is
    /// replaced in one delete+insert window. Plans must be committed together:
    /// replacing per plan would wipe the other plans' contributions.
    pub async fn commit_idempotent(
        &self,
        venture_id: VentureId,
        plan_ids: &[PlanId],
        day: NaiveDate,
    ) -> Result<IdempotentOutcome> {
        let mut contributions = Vec::new();
        for &plan_id in plan_ids {
            contributions.extend(self.compute_plan_day(plan_id, day, None).await?);
        }

        // Aggregate per user; BTreeMap keeps row order deterministic so
        // repeated runs converge to identical ledger contents.
        let mut totals: BTreeMap<UserId, (f64, Vec<BreakdownRule>)> = BTreeMap::new();
        for c in &contributions {
            let slot = totals.entry(c.user_id).or_insert_with(|| (0.0, Vec::new()));
            slot.0 += c.amount;
            slot.1.push(BreakdownRule {
                rule_id: c.rule_id,
                plan_id: Some(c.plan_id),
                amount: c.amount,
            });
        }

        let computed_at = Utc::now();
        let entries: Vec<NewLedgerEntry> = totals
            .into_iter()
            .map(|(user_id, (amount, rules))| NewLedgerEntry {
                user_id,
                venture_id,
                day,
                amount,
                currency: LEDGER_CURRENCY.to_string(),
                breakdown: Breakdown {
                    rules,
                    plan_ids: Some(plan_ids.to_vec()),
                    computed_at: Some(computed_at),
                },
            })
            .collect();

        let (deleted, inserted) = self.ledger.replace_day(venture_id, day, entries).await?;
        info!(venture_id, %day, deleted, inserted, "idempotent incentive commit");
        Ok(IdempotentOutcome {
            contributions,
            deleted,
            inserted,
        })
    }

    /// Idempotent commit scoped to a single plan, resolving its venture.
    ///
    /// Only appropriate when the plan is the venture's sole active plan; the
    /// scheduled job always commits all of a venture's plans together.
    pub async fn commit_plan_idempotent(
        &self,
        plan_id: PlanId,
        day: NaiveDate,
    ) -> Result<IdempotentOutcome> {
        let Some(plan) = self.plans.plan(plan_id).await? else {
            return Ok(IdempotentOutcome::default());
        };
        self.commit_idempotent(plan.venture_id, &[plan_id], day).await
    }
}

#[cfg(test)]
mod tests;
