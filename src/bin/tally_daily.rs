//! Daily incentive settlement entrypoint.
//!
//! Intended to be invoked by an external scheduler (cron, Kubernetes
//! CronJob). Overlapping invocations are serialized by the job lock; a second
//! instance skips and exits cleanly.
//!
//! Usage:
//!   tally-daily [--config FILE] [--date YYYY-MM-DD] [--venture ID] [--dry-run]

use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tally::config::{Config, LOG_ENV_VAR};
use tally::jobs::{
    IncentiveDailyJob, IncentiveDailyOptions, JobAlerter, JobRunner, NoopAlerter, WebhookAlerter,
};
use tally::lock::{LockOptions, PgLockManager};
use tally::settlement::SettlementCommitter;
use tally::storage::postgres::{
    PgLedgerStore, PgMembershipStore, PgMetricSource, PgPlanStore, PgRunLogStore,
};

struct Args {
    config: Option<String>,
    date: Option<NaiveDate>,
    venture: Option<i64>,
    dry_run: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        date: None,
        venture: None,
        dry_run: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                args.config = Some(iter.next().ok_or("--config requires a path")?);
            }
            "--date" => {
                let value = iter.next().ok_or("--date requires YYYY-MM-DD")?;
                args.date = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid date: {value}"))?,
                );
            }
            "--venture" => {
                let value = iter.next().ok_or("--venture requires an id")?;
                args.venture = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid venture id: {value}"))?,
                );
            }
            "--dry-run" => args.dry_run = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let pool = match tally::storage::connect(&config.database).await {
        Ok(pool) => pool,
        Err(err) => {
            error!(error = %err, "failed to connect to database");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = tally::storage::init_schema(&pool).await {
        error!(error = %err, "failed to initialize schema");
        return ExitCode::FAILURE;
    }

    let plans = Arc::new(PgPlanStore::new(pool.clone()));
    let committer = Arc::new(SettlementCommitter::new(
        Arc::new(PgMetricSource::new(pool.clone())),
        plans.clone(),
        Arc::new(PgMembershipStore::new(pool.clone())),
        Arc::new(PgLedgerStore::new(pool.clone())),
    ));

    let alerts: Arc<dyn JobAlerter> = match &config.alerts.webhook_url {
        Some(url) => Arc::new(WebhookAlerter::new(url.clone())),
        None => Arc::new(NoopAlerter),
    };
    let runner = JobRunner::new(
        Arc::new(PgLockManager::new(pool.clone())),
        Arc::new(PgRunLogStore::new(pool)),
        alerts,
    )
    .with_lock_options(LockOptions {
        timeout: config.jobs.timeout(),
        retry_interval: config.jobs.lock_retry_interval(),
        max_retries: config.jobs.lock_max_retries,
    });

    let job = IncentiveDailyJob::new(committer, plans);
    let outcome = job
        .run_scheduled(
            &runner,
            IncentiveDailyOptions {
                venture_id: args.venture,
                day: args.date,
                dry_run: args.dry_run,
            },
        )
        .await;

    match (outcome.success, outcome.run_log_id) {
        (true, _) => {
            info!(duration_ms = outcome.duration.as_millis() as u64, "done");
            ExitCode::SUCCESS
        }
        (false, None) => {
            // Skipped: another instance holds the lock.
            info!("run skipped");
            ExitCode::SUCCESS
        }
        (false, Some(_)) => ExitCode::FAILURE,
    }
}
