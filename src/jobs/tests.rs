use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::interfaces::{JobStatus, LedgerStore, LoadRow, LoadStatus, RunLogStore};
use crate::metrics::MetricKey;
use crate::rules::{CalcType, IncentiveRule, RuleConfig};
use crate::settlement::SettlementCommitter;
use crate::storage::mock::{
    MockLedgerStore, MockLockManager, MockMembershipStore, MockMetricSource, MockPlanStore,
    MockRunLogStore,
};

use super::alerts::{JobAlerter, JobFailureAlert};
use super::*;

/// Captures alerts for assertions.
#[derive(Default)]
struct RecordingAlerter {
    alerts: Mutex<Vec<JobFailureAlert>>,
}

impl RecordingAlerter {
    async fn alerts(&self) -> Vec<JobFailureAlert> {
        self.alerts.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl JobAlerter for RecordingAlerter {
    async fn alert_failure(&self, alert: JobFailureAlert) {
        self.alerts.lock().await.push(alert);
    }
}

struct Harness {
    locks: Arc<MockLockManager>,
    run_log: Arc<MockRunLogStore>,
    alerts: Arc<RecordingAlerter>,
    runner: JobRunner,
}

fn harness() -> Harness {
    let locks = Arc::new(MockLockManager::new());
    let run_log = Arc::new(MockRunLogStore::new());
    let alerts = Arc::new(RecordingAlerter::default());
    let runner = JobRunner::new(locks.clone(), run_log.clone(), alerts.clone());
    Harness {
        locks,
        run_log,
        alerts,
        runner,
    }
}

fn options(key: &str) -> JobRunOptions {
    JobRunOptions::new("TEST_JOB", key)
}

#[tokio::test]
async fn successful_run_writes_a_success_row_and_releases_the_lock() {
    let h = harness();

    let outcome = h
        .runner
        .run(options("K1"), || async { Ok(JobReport::ok(42u32)) })
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.result, Some(42));
    assert_eq!(outcome.error, None);

    let records = h.run_log.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, JobStatus::Success);
    assert!(records[0].ended_at.is_some());
    assert_eq!(records[0].job_key, "K1");

    assert!(!h.locks.is_held("job:K1").await);
    assert!(h.alerts.alerts().await.is_empty());
}

#[tokio::test]
async fn held_lock_skips_without_an_audit_row() {
    let h = harness();
    h.locks.hold("job:K1").await;

    let outcome = h
        .runner
        .run(options("K1"), || async { Ok(JobReport::ok(0u32)) })
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.run_log_id, None);
    assert!(h.run_log.records().await.is_empty());
    assert!(h.alerts.alerts().await.is_empty());
}

#[tokio::test]
async fn lock_backend_error_skips_the_run() {
    let h = harness();
    h.locks.set_fail_acquire();

    let outcome = h
        .runner
        .run(options("K1"), || async { Ok(JobReport::ok(0u32)) })
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.run_log_id, None);
    assert!(h.run_log.records().await.is_empty());
}

#[tokio::test]
async fn failing_work_writes_an_error_row_and_alerts() {
    let h = harness();

    let outcome: JobOutcome<u32> = h
        .runner
        .run(options("K1"), || async {
            Err(JobError::msg("metric query exploded"))
        })
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("metric query exploded"));

    let records = h.run_log.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, JobStatus::Error);
    assert_eq!(records[0].error.as_deref(), Some("metric query exploded"));

    let alerts = h.alerts.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].job_name, "TEST_JOB");
    assert!(!h.locks.is_held("job:K1").await);
}

#[tokio::test]
async fn panicking_work_still_releases_the_lock_and_records_an_error() {
    let h = harness();

    let outcome: JobOutcome<u32> = h
        .runner
        .run(options("K1"), || async { panic!("ledger exploded") })
        .await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("ledger exploded"));

    // The run still ends with a terminal audit row, an alert, and a free
    // lock; the panic never unwinds past the harness.
    let records = h.run_log.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, JobStatus::Error);
    assert_eq!(h.alerts.alerts().await.len(), 1);
    assert!(!h.locks.is_held("job:K1").await);
}

#[tokio::test]
async fn timeout_cancels_the_work_and_records_an_error() {
    let h = harness();
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();

    let outcome: JobOutcome<u32> = h
        .runner
        .run(
            options("K1").with_timeout(Duration::from_millis(20)),
            move || async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(JobReport::ok(1u32))
            },
        )
        .await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("timed out"));

    let records = h.run_log.records().await;
    assert_eq!(records[0].status, JobStatus::Error);
    assert_eq!(h.alerts.alerts().await.len(), 1);
    assert!(!h.locks.is_held("job:K1").await);

    // The losing future was dropped, so its tail never runs.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn partial_report_keeps_the_value_and_alerts() {
    let h = harness();

    let outcome = h
        .runner
        .run(options("K1"), || async {
            Ok(JobReport::partial(7u32, vec!["venture 2 failed".into()]))
        })
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.result, Some(7));
    assert_eq!(outcome.error.as_deref(), Some("venture 2 failed"));

    let records = h.run_log.records().await;
    assert_eq!(records[0].status, JobStatus::Partial);
    assert_eq!(h.alerts.alerts().await.len(), 1);
}

#[tokio::test]
async fn skip_lock_runs_even_when_the_lock_is_held() {
    let h = harness();
    h.locks.hold("job:K1").await;

    let outcome = h
        .runner
        .run(options("K1").without_lock(), || async {
            Ok(JobReport::ok(5u32))
        })
        .await;

    assert!(outcome.success);
    assert_eq!(h.run_log.records().await.len(), 1);
    // The pre-held lock is untouched.
    assert!(h.locks.is_held("job:K1").await);
}

#[tokio::test]
async fn run_log_failure_still_leaves_a_terminal_row() {
    let h = harness();
    h.run_log.set_fail_create();

    let outcome: JobOutcome<u32> = h
        .runner
        .run(options("K1"), || async { Ok(JobReport::ok(1u32)) })
        .await;

    assert!(!outcome.success);
    let records = h.run_log.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, JobStatus::Error);
    assert_eq!(h.alerts.alerts().await.len(), 1);
    assert!(!h.locks.is_held("job:K1").await);
}

#[tokio::test]
async fn is_job_running_reflects_recent_running_rows() {
    let h = harness();
    assert!(!h.runner.is_job_running("TEST_JOB").await);

    h.run_log
        .create_running("TEST_JOB", "K1", chrono::Utc::now(), &serde_json::json!({}))
        .await
        .unwrap();
    assert!(h.runner.is_job_running("TEST_JOB").await);
}

fn flat_rule(id: i64, plan_id: i64, key: MetricKey, rate: f64) -> IncentiveRule {
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

fn delivered_load(user: i64) -> LoadRow {
    LoadRow {
        created_by: Some(user),
        status: LoadStatus::Delivered,
        bill_amount: Some(1000.0),
        miles: Some(250.0),
        margin_amount: Some(120.0),
    }
}

struct DailyFixture {
    source: Arc<MockMetricSource>,
    plans: Arc<MockPlanStore>,
    ledger: Arc<MockLedgerStore>,
    job: IncentiveDailyJob,
}

async fn daily_fixture() -> DailyFixture {
    let source = Arc::new(MockMetricSource::new());
    let plans = Arc::new(MockPlanStore::new());
    let members = Arc::new(MockMembershipStore::new());
    let ledger = Arc::new(MockLedgerStore::new());
    let committer = Arc::new(SettlementCommitter::new(
        source.clone(),
        plans.clone(),
        members,
        ledger.clone(),
    ));
    let job = IncentiveDailyJob::new(committer, plans.clone());
    DailyFixture {
        source,
        plans,
        ledger,
        job,
    }
}

fn dec_15() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 15).unwrap()
}

#[tokio::test]
async fn daily_job_settles_every_venture_and_audits_the_run() {
    let h = harness();
    let f = daily_fixture().await;
    f.plans.add_venture(1, "Acme Freight").await;
    f.plans.add_plan(10, 1, "Broker comp").await;
    f.plans
        .add_rule(flat_rule(100, 10, MetricKey::LoadsCompleted, 25.0))
        .await;
    f.source.push_load(1, delivered_load(7)).await;

    let outcome = f
        .job
        .run_scheduled(
            &h.runner,
            IncentiveDailyOptions {
                day: Some(dec_15()),
                ..Default::default()
            },
        )
        .await;

    assert!(outcome.success);
    let stats = outcome.result.unwrap();
    assert_eq!(stats.ventures_processed, 1);
    assert_eq!(stats.total_inserted, 1);

    let entries = f.ledger.entries_for_day(1, dec_15()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, 25.0);

    let records = h.run_log.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, JobStatus::Success);
    assert_eq!(records[0].job_key, "INCENTIVE_DAILY:2025-12-15");
    assert!(!h.locks.is_held("job:INCENTIVE_DAILY:2025-12-15").await);
}

#[tokio::test]
async fn one_failing_venture_degrades_the_run_to_partial() {
    let h = harness();
    let f = daily_fixture().await;
    f.plans.add_venture(1, "Acme Freight").await;
    f.plans.add_plan(10, 1, "Broker comp").await;
    f.plans
        .add_rule(flat_rule(100, 10, MetricKey::LoadsCompleted, 25.0))
        .await;
    f.source.push_load(1, delivered_load(7)).await;

    f.plans.add_venture(2, "Broken Freight").await;
    f.plans.add_plan(20, 2, "Broker comp").await;
    f.plans
        .add_rule(flat_rule(200, 20, MetricKey::LoadsCompleted, 25.0))
        .await;
    f.source.set_fail_freight(2).await;

    let outcome = f
        .job
        .run_scheduled(
            &h.runner,
            IncentiveDailyOptions {
                day: Some(dec_15()),
                ..Default::default()
            },
        )
        .await;

    // The healthy venture's rows survive the other venture's failure.
    assert!(outcome.success);
    assert!(outcome.error.unwrap().contains("venture 2"));
    assert_eq!(f.ledger.entries_for_day(1, dec_15()).await.unwrap().len(), 1);

    let records = h.run_log.records().await;
    assert_eq!(records[0].status, JobStatus::Partial);
    assert_eq!(h.alerts.alerts().await.len(), 1);
}

#[tokio::test]
async fn dry_run_counts_users_without_writing() {
    let f = daily_fixture().await;
    f.plans.add_venture(1, "Acme Freight").await;
    f.plans.add_plan(10, 1, "Broker comp").await;
    f.plans
        .add_rule(flat_rule(100, 10, MetricKey::LoadsCompleted, 25.0))
        .await;
    f.source.push_load(1, delivered_load(7)).await;
    f.source.push_load(1, delivered_load(8)).await;

    let report = f
        .job
        .execute(&IncentiveDailyOptions {
            day: Some(dec_15()),
            dry_run: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(report.errors.is_empty());
    assert_eq!(report.value.users_affected, 2);
    assert_eq!(report.value.total_inserted, 0);
    assert!(f.ledger.entries().await.is_empty());
}

#[tokio::test]
async fn venture_listing_failure_aborts_the_run() {
    let f = daily_fixture().await;
    f.plans.set_fail_ventures();

    let err = f
        .job
        .execute(&IncentiveDailyOptions {
            day: Some(dec_15()),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::Storage(_)));
}

#[tokio::test]
async fn venture_filter_settles_only_that_venture() {
    let f = daily_fixture().await;
    f.plans.add_venture(1, "Acme Freight").await;
    f.plans.add_plan(10, 1, "Broker comp").await;
    f.plans
        .add_rule(flat_rule(100, 10, MetricKey::LoadsCompleted, 25.0))
        .await;
    f.plans.add_venture(2, "Beta Freight").await;
    f.plans.add_plan(20, 2, "Broker comp").await;
    f.plans
        .add_rule(flat_rule(200, 20, MetricKey::LoadsCompleted, 25.0))
        .await;
    f.source.push_load(1, delivered_load(7)).await;
    f.source.push_load(2, delivered_load(8)).await;

    let report = f
        .job
        .execute(&IncentiveDailyOptions {
            venture_id: Some(1),
            day: Some(dec_15()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(report.value.ventures_processed, 1);
    assert_eq!(f.ledger.entries_for_day(1, dec_15()).await.unwrap().len(), 1);
    assert!(f.ledger.entries_for_day(2, dec_15()).await.unwrap().is_empty());
}
