//! The scheduled daily incentive job.
//!
//! Recomputes and settles incentives for every active venture for one
//! calendar day (yesterday by default). Each venture's plans are committed
//! together in one idempotent window; a failure in one venture is recorded
//! and does not stop the others.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::interfaces::{PlanId, PlanStore, StorageError, Venture, VentureId};
use crate::settlement::SettlementCommitter;

use super::runner::{JobError, JobOutcome, JobReport, JobRunOptions, JobRunner};

/// Job name under which scheduled runs are audited and locked.
pub const INCENTIVE_DAILY_JOB: &str = "INCENTIVE_DAILY";

/// Options for one invocation.
#[derive(Debug, Clone, Default)]
pub struct IncentiveDailyOptions {
    /// Restrict to one venture; all active ventures otherwise.
    pub venture_id: Option<VentureId>,
    /// Calendar day to settle; yesterday (UTC) when absent.
    pub day: Option<NaiveDate>,
    /// Compute and count without writing.
    pub dry_run: bool,
}

/// Accumulated counters, serialized into the run log's stats column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncentiveDailyStats {
    pub day: Option<NaiveDate>,
    pub dry_run: bool,
    pub ventures_processed: u64,
    pub plans_processed: u64,
    pub users_affected: u64,
    pub total_deleted: u64,
    pub total_inserted: u64,
}

/// The daily settlement unit of work.
pub struct IncentiveDailyJob {
    committer: Arc<SettlementCommitter>,
    plans: Arc<dyn PlanStore>,
}

impl IncentiveDailyJob {
    pub fn new(committer: Arc<SettlementCommitter>, plans: Arc<dyn PlanStore>) -> Self {
        Self { committer, plans }
    }

    /// Execute the job body. Venture-level failures are survived and reported
    /// as sub-step errors; failures to even list ventures abort the run.
    pub async fn execute(
        &self,
        options: &IncentiveDailyOptions,
    ) -> Result<JobReport<IncentiveDailyStats>, JobError> {
        let day = options.day.unwrap_or_else(yesterday_utc);
        let mut stats = IncentiveDailyStats {
            day: Some(day),
            dry_run: options.dry_run,
            ..Default::default()
        };
        let mut errors = Vec::new();

        let ventures: Vec<Venture> = match options.venture_id {
            Some(venture_id) => self
                .plans
                .venture(venture_id)
                .await
                .map_err(JobError::from)?
                .into_iter()
                .collect(),
            None => self.plans.active_ventures().await.map_err(JobError::from)?,
        };

        for venture in ventures {
            let plans = self.plans.active_plans(venture.id).await?;
            if plans.is_empty() {
                continue;
            }

            stats.ventures_processed += 1;
            stats.plans_processed += plans.len() as u64;
            let plan_ids: Vec<PlanId> = plans.iter().map(|p| p.id).collect();

            if let Err(err) = self
                .settle_venture(venture.id, &plan_ids, day, options.dry_run, &mut stats)
                .await
            {
                errors.push(format!("venture {} ({}): {}", venture.id, venture.name, err));
            }
        }

        info!(
            %day,
            ventures = stats.ventures_processed,
            plans = stats.plans_processed,
            inserted = stats.total_inserted,
            errors = errors.len(),
            "daily incentive pass finished"
        );

        if errors.is_empty() {
            Ok(JobReport::ok(stats))
        } else {
            Ok(JobReport::partial(stats, errors))
        }
    }

    async fn settle_venture(
        &self,
        venture_id: VentureId,
        plan_ids: &[PlanId],
        day: NaiveDate,
        dry_run: bool,
        stats: &mut IncentiveDailyStats,
    ) -> Result<(), StorageError> {
        if dry_run {
            let mut unique_users = BTreeSet::new();
            for &plan_id in plan_ids {
                let contributions = self.committer.compute_plan_day(plan_id, day, None).await?;
                unique_users.extend(contributions.iter().map(|c| c.user_id));
            }
            stats.users_affected += unique_users.len() as u64;
            return Ok(());
        }

        let outcome = self.committer.commit_idempotent(venture_id, plan_ids, day).await?;
        stats.total_deleted += outcome.deleted;
        stats.total_inserted += outcome.inserted;
        stats.users_affected += outcome.inserted;
        Ok(())
    }

    /// Run under the harness, keyed by day so overlapping schedulers skip
    /// instead of queueing.
    pub async fn run_scheduled(
        &self,
        runner: &JobRunner,
        options: IncentiveDailyOptions,
    ) -> JobOutcome<IncentiveDailyStats> {
        let day = options.day.unwrap_or_else(yesterday_utc);
        let options = IncentiveDailyOptions {
            day: Some(day),
            ..options
        };
        let run_options =
            JobRunOptions::new(INCENTIVE_DAILY_JOB, format!("{INCENTIVE_DAILY_JOB}:{day}"))
                .with_timeout(runner.job_timeout());

        runner
            .run(run_options, || async move { self.execute(&options).await })
            .await
    }
}

fn yesterday_utc() -> NaiveDate {
    let today = Utc::now().date_naive();
    today.checked_sub_days(Days::new(1)).unwrap_or(today)
}
