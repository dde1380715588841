use std::sync::Arc;

use chrono::NaiveDate;

use crate::interfaces::{LoadRow, LoadStatus, ReviewResponseRow};
use crate::metrics::MetricKey;
use crate::rules::{CalcType, IncentiveRule, RuleConfig};
use crate::storage::mock::{
    MockLedgerStore, MockMembershipStore, MockMetricSource, MockPlanStore,
};

use super::*;

const VENTURE: VentureId = 1;
const PLAN: PlanId = 10;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 15).unwrap()
}

fn delivered_load(user: UserId) -> LoadRow {
    LoadRow {
        created_by: Some(user),
        status: LoadStatus::Delivered,
        bill_amount: Some(1000.0),
        miles: Some(250.0),
        margin_amount: Some(120.0),
    }
}

fn flat_rule(id: RuleId, plan_id: PlanId, key: MetricKey, rate: f64) -> IncentiveRule {
    IncentiveRule {
        id,
        plan_id,
        metric_key: key,
        calc_type: CalcType::FlatPerUnit,
        rate: Some(rate),
        config: RuleConfig::default(),
        is_enabled: true,
    }
}

struct Fixture {
    source: Arc<MockMetricSource>,
    plans: Arc<MockPlanStore>,
    members: Arc<MockMembershipStore>,
    ledger: Arc<MockLedgerStore>,
    committer: SettlementCommitter,
}

async fn fixture() -> Fixture {
    let source = Arc::new(MockMetricSource::new());
    let plans = Arc::new(MockPlanStore::new());
    let members = Arc::new(MockMembershipStore::new());
    let ledger = Arc::new(MockLedgerStore::new());
    plans.add_venture(VENTURE, "Acme Freight").await;
    plans.add_plan(PLAN, VENTURE, "Broker comp").await;
    let committer = SettlementCommitter::new(
        source.clone(),
        plans.clone(),
        members.clone(),
        ledger.clone(),
    );
    Fixture {
        source,
        plans,
        members,
        ledger,
        committer,
    }
}

#[tokio::test]
async fn flat_per_unit_settles_delivered_loads() {
    let f = fixture().await;
    f.plans
        .add_rule(flat_rule(100, PLAN, MetricKey::LoadsCompleted, 25.0))
        .await;
    for _ in 0..4 {
        f.source.push_load(VENTURE, delivered_load(7)).await;
    }
    // Covered loads never pay.
    f.source
        .push_load(
            VENTURE,
            LoadRow {
                status: LoadStatus::Covered,
                ..delivered_load(7)
            },
        )
        .await;

    let outcome = f.committer.commit_idempotent(VENTURE, &[PLAN], day()).await.unwrap();
    assert_eq!(outcome.deleted, 0);
    assert_eq!(outcome.inserted, 1);

    let entries = f.ledger.entries_for_day(VENTURE, day()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, 7);
    assert_eq!(entries[0].amount, 100.0);
    assert_eq!(entries[0].currency, LEDGER_CURRENCY);
    assert_eq!(entries[0].breakdown.plan_ids, Some(vec![PLAN]));
}

#[tokio::test]
async fn idempotent_commit_converges_under_reruns() {
    let f = fixture().await;
    f.plans
        .add_rule(flat_rule(100, PLAN, MetricKey::LoadsCompleted, 25.0))
        .await;
    f.source.push_load(VENTURE, delivered_load(7)).await;
    f.source.push_load(VENTURE, delivered_load(8)).await;

    let first = f.committer.commit_idempotent(VENTURE, &[PLAN], day()).await.unwrap();
    assert_eq!((first.deleted, first.inserted), (0, 2));

    let second = f.committer.commit_idempotent(VENTURE, &[PLAN], day()).await.unwrap();
    assert_eq!((second.deleted, second.inserted), (2, 2));

    let entries = f.ledger.entries_for_day(VENTURE, day()).await.unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries {
        assert_eq!(entry.amount, 25.0);
    }
}

#[tokio::test]
async fn multiple_plans_merge_into_one_row_per_user() {
    let f = fixture().await;
    let other_plan = 11;
    f.plans.add_plan(other_plan, VENTURE, "Bonus comp").await;
    f.plans
        .add_rule(flat_rule(100, PLAN, MetricKey::LoadsCompleted, 25.0))
        .await;
    f.plans
        .add_rule(flat_rule(200, other_plan, MetricKey::LoadsRevenue, 0.01))
        .await;
    f.source.push_load(VENTURE, delivered_load(7)).await;

    let outcome = f
        .committer
        .commit_idempotent(VENTURE, &[PLAN, other_plan], day())
        .await
        .unwrap();
    assert_eq!(outcome.inserted, 1);

    let entries = f.ledger.entries_for_day(VENTURE, day()).await.unwrap();
    assert_eq!(entries.len(), 1);
    // 1 load * 25 + 1000 revenue * 0.01
    assert_eq!(entries[0].amount, 35.0);
    assert_eq!(entries[0].breakdown.rules.len(), 2);
    assert_eq!(entries[0].breakdown.rules[0].plan_id, Some(PLAN));
    assert_eq!(entries[0].breakdown.rules[1].plan_id, Some(other_plan));
    assert_eq!(entries[0].breakdown.plan_ids, Some(vec![PLAN, other_plan]));

    // Re-running both plans together must not double anything.
    f.committer
        .commit_idempotent(VENTURE, &[PLAN, other_plan], day())
        .await
        .unwrap();
    let entries = f.ledger.entries_for_day(VENTURE, day()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, 35.0);
}

#[tokio::test]
async fn members_without_metrics_get_no_row() {
    let f = fixture().await;
    f.plans
        .add_rule(flat_rule(100, PLAN, MetricKey::LoadsCompleted, 25.0))
        .await;
    f.members.add_member(VENTURE, 42).await;
    f.source.push_load(VENTURE, delivered_load(7)).await;

    let contributions = f.committer.compute_plan_day(PLAN, day(), None).await.unwrap();
    assert_eq!(contributions.len(), 1);
    assert_eq!(contributions[0].user_id, 7);
}

#[tokio::test]
async fn metric_bearing_non_members_are_paid() {
    let f = fixture().await;
    f.plans
        .add_rule(flat_rule(100, PLAN, MetricKey::HotelReviewsResponded, 5.0))
        .await;
    f.members.add_member(VENTURE, 42).await;
    // User 9 responded to reviews but holds no formal membership.
    f.source
        .push_review(VENTURE, ReviewResponseRow { responded_by: 9 })
        .await;

    let outcome = f.committer.commit_idempotent(VENTURE, &[PLAN], day()).await.unwrap();
    assert_eq!(outcome.inserted, 1);
    let entries = f.ledger.entries_for_day(VENTURE, day()).await.unwrap();
    assert_eq!(entries[0].user_id, 9);
    assert_eq!(entries[0].amount, 5.0);
}

#[tokio::test]
async fn restrict_to_limits_the_user_universe() {
    let f = fixture().await;
    f.plans
        .add_rule(flat_rule(100, PLAN, MetricKey::LoadsCompleted, 25.0))
        .await;
    f.source.push_load(VENTURE, delivered_load(7)).await;
    f.source.push_load(VENTURE, delivered_load(8)).await;

    let contributions = f
        .committer
        .compute_plan_day(PLAN, day(), Some(&[8]))
        .await
        .unwrap();
    assert_eq!(contributions.len(), 1);
    assert_eq!(contributions[0].user_id, 8);
}

#[tokio::test]
async fn additive_commit_doubles_on_rerun() {
    let f = fixture().await;
    f.plans
        .add_rule(flat_rule(100, PLAN, MetricKey::LoadsCompleted, 25.0))
        .await;
    f.source.push_load(VENTURE, delivered_load(7)).await;

    let first = f.committer.commit_additive(PLAN, day()).await.unwrap();
    assert_eq!((first.inserted, first.updated), (1, 0));

    let second = f.committer.commit_additive(PLAN, day()).await.unwrap();
    assert_eq!((second.inserted, second.updated), (0, 1));

    let entries = f.ledger.entries_for_day(VENTURE, day()).await.unwrap();
    assert_eq!(entries[0].amount, 50.0);
    assert_eq!(entries[0].breakdown.rules.len(), 2);
}

#[tokio::test]
async fn idempotent_commit_with_no_contributions_clears_the_day() {
    let f = fixture().await;
    f.plans
        .add_rule(flat_rule(100, PLAN, MetricKey::LoadsCompleted, 25.0))
        .await;
    f.source.push_load(VENTURE, delivered_load(7)).await;
    f.committer.commit_idempotent(VENTURE, &[PLAN], day()).await.unwrap();

    // Re-committing with no plans in scope wipes the day instead of leaving
    // stale rows behind.
    let outcome = f.committer.commit_idempotent(VENTURE, &[], day()).await.unwrap();
    assert_eq!((outcome.deleted, outcome.inserted), (1, 0));
    assert!(f.ledger.entries_for_day(VENTURE, day()).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_plan_yields_nothing() {
    let f = fixture().await;
    let contributions = f.committer.compute_plan_day(999, day(), None).await.unwrap();
    assert!(contributions.is_empty());

    let outcome = f.committer.commit_plan_idempotent(999, day()).await.unwrap();
    assert_eq!(outcome, IdempotentOutcome::default());
}

#[tokio::test]
async fn zero_amounts_are_suppressed() {
    let f = fixture().await;
    // Rate of zero evaluates to zero for every user.
    f.plans
        .add_rule(flat_rule(100, PLAN, MetricKey::LoadsCompleted, 0.0))
        .await;
    f.source.push_load(VENTURE, delivered_load(7)).await;

    let outcome = f.committer.commit_idempotent(VENTURE, &[PLAN], day()).await.unwrap();
    assert_eq!(outcome.inserted, 0);
    assert!(f.ledger.entries().await.is_empty());
}
