//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query
//! building, plus DDL for the tables this crate owns. The operational domain
//! tables (loads, call logs, reviews, plans) belong to the surrounding
//! application; their DDL here is the minimal shape used by integration
//! tests and local bootstrap.

use sea_query::Iden;

/// Incentive ledger table.
#[derive(Iden)]
pub enum IncentiveDaily {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "user_id"]
    UserId,
    #[iden = "venture_id"]
    VentureId,
    #[iden = "day"]
    Day,
    #[iden = "amount"]
    Amount,
    #[iden = "currency"]
    Currency,
    #[iden = "breakdown"]
    Breakdown,
}

/// Job run audit log table.
#[derive(Iden)]
pub enum JobRunLog {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "job_name"]
    JobName,
    #[iden = "job_key"]
    JobKey,
    #[iden = "status"]
    Status,
    #[iden = "started_at"]
    StartedAt,
    #[iden = "ended_at"]
    EndedAt,
    #[iden = "stats"]
    Stats,
    #[iden = "error"]
    Error,
}

/// Fallback lock-tracking table.
#[derive(Iden)]
pub enum JobLock {
    Table,
    #[iden = "lock_key"]
    LockKey,
    #[iden = "acquired_at"]
    AcquiredAt,
    #[iden = "expires_at"]
    ExpiresAt,
}

/// Freight loads (domain-owned).
#[derive(Iden)]
pub enum Loads {
    Table,
    #[iden = "venture_id"]
    VentureId,
    #[iden = "created_by_id"]
    CreatedById,
    #[iden = "load_status"]
    LoadStatus,
    #[iden = "billing_date"]
    BillingDate,
    #[iden = "bill_amount"]
    BillAmount,
    #[iden = "miles"]
    Miles,
    #[iden = "margin_amount"]
    MarginAmount,
}

/// Call-center activity logs (domain-owned).
#[derive(Iden)]
pub enum CallLogs {
    Table,
    #[iden = "venture_id"]
    VentureId,
    #[iden = "agent_id"]
    AgentId,
    #[iden = "dial_count"]
    DialCount,
    #[iden = "is_connected"]
    IsConnected,
    #[iden = "deal_won"]
    DealWon,
    #[iden = "call_started_at"]
    CallStartedAt,
    #[iden = "call_ended_at"]
    CallEndedAt,
}

/// Call-center agents; maps agent records to backing users (domain-owned).
#[derive(Iden)]
pub enum CallAgents {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "user_id"]
    UserId,
}

/// Hotel reviews (domain-owned).
#[derive(Iden)]
pub enum HotelReviews {
    Table,
    #[iden = "hotel_id"]
    HotelId,
    #[iden = "responded_by_id"]
    RespondedById,
    #[iden = "review_date"]
    ReviewDate,
}

/// Hotels (domain-owned).
#[derive(Iden)]
pub enum Hotels {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "venture_id"]
    VentureId,
}

/// Daily hotel KPI rollups (domain-owned).
#[derive(Iden)]
pub enum HotelKpiDaily {
    Table,
    #[iden = "venture_id"]
    VentureId,
    #[iden = "day"]
    Day,
    #[iden = "adr"]
    Adr,
    #[iden = "revpar"]
    Revpar,
}

/// Ventures (domain-owned).
#[derive(Iden)]
pub enum Ventures {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "name"]
    Name,
    #[iden = "is_active"]
    IsActive,
}

/// Venture membership (domain-owned).
#[derive(Iden)]
pub enum VentureMembers {
    Table,
    #[iden = "venture_id"]
    VentureId,
    #[iden = "user_id"]
    UserId,
}

/// Compensation plans (domain-owned).
#[derive(Iden)]
pub enum IncentivePlans {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "venture_id"]
    VentureId,
    #[iden = "name"]
    Name,
    #[iden = "is_active"]
    IsActive,
}

/// Compensation rules (domain-owned).
#[derive(Iden)]
pub enum IncentiveRules {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "plan_id"]
    PlanId,
    #[iden = "metric_key"]
    MetricKey,
    #[iden = "calc_type"]
    CalcType,
    #[iden = "rate"]
    Rate,
    #[iden = "config"]
    Config,
    #[iden = "is_enabled"]
    IsEnabled,
}

/// SQL for creating the incentive ledger table.
pub const CREATE_LEDGER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS incentive_daily (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL,
    venture_id BIGINT NOT NULL,
    day DATE NOT NULL,
    amount DOUBLE PRECISION NOT NULL,
    currency TEXT NOT NULL DEFAULT 'USD',
    breakdown JSONB NOT NULL DEFAULT '{}'::jsonb,
    UNIQUE (user_id, venture_id, day)
);

CREATE INDEX IF NOT EXISTS idx_incentive_daily_scope ON incentive_daily(venture_id, day);
"#;

/// SQL for creating the job run log table.
pub const CREATE_RUN_LOG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS job_run_log (
    id BIGSERIAL PRIMARY KEY,
    job_name TEXT NOT NULL,
    job_key TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    started_at TIMESTAMPTZ NOT NULL,
    ended_at TIMESTAMPTZ,
    stats JSONB NOT NULL DEFAULT '{}'::jsonb,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_job_run_log_name_status ON job_run_log(job_name, status, started_at);
"#;

/// SQL for creating the fallback lock table.
pub const CREATE_LOCK_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS job_lock (
    lock_key TEXT PRIMARY KEY,
    acquired_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL
);
"#;

/// Minimal domain-table shapes for integration tests and local bootstrap.
pub const CREATE_DOMAIN_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS ventures (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS venture_members (
    venture_id BIGINT NOT NULL,
    user_id BIGINT NOT NULL,
    PRIMARY KEY (venture_id, user_id)
);

CREATE TABLE IF NOT EXISTS incentive_plans (
    id BIGSERIAL PRIMARY KEY,
    venture_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS incentive_rules (
    id BIGSERIAL PRIMARY KEY,
    plan_id BIGINT NOT NULL,
    metric_key TEXT NOT NULL,
    calc_type TEXT NOT NULL,
    rate DOUBLE PRECISION,
    config JSONB NOT NULL DEFAULT '{}'::jsonb,
    is_enabled BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS loads (
    id BIGSERIAL PRIMARY KEY,
    venture_id BIGINT NOT NULL,
    created_by_id BIGINT,
    load_status TEXT NOT NULL,
    billing_date TIMESTAMPTZ,
    bill_amount DOUBLE PRECISION,
    miles DOUBLE PRECISION,
    margin_amount DOUBLE PRECISION
);

CREATE TABLE IF NOT EXISTS call_agents (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT
);

CREATE TABLE IF NOT EXISTS call_logs (
    id BIGSERIAL PRIMARY KEY,
    venture_id BIGINT NOT NULL,
    agent_id BIGINT,
    dial_count BIGINT,
    is_connected BOOLEAN NOT NULL DEFAULT FALSE,
    deal_won BOOLEAN NOT NULL DEFAULT FALSE,
    call_started_at TIMESTAMPTZ,
    call_ended_at TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS hotels (
    id BIGSERIAL PRIMARY KEY,
    venture_id BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS hotel_reviews (
    id BIGSERIAL PRIMARY KEY,
    hotel_id BIGINT NOT NULL,
    responded_by_id BIGINT,
    review_date TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS hotel_kpi_daily (
    venture_id BIGINT NOT NULL,
    day DATE NOT NULL,
    adr DOUBLE PRECISION,
    revpar DOUBLE PRECISION,
    PRIMARY KEY (venture_id, day)
);
"#;
