//! PostgreSQL queries against the operational domains.
//!
//! These fetch raw rows only; all aggregation semantics live in the pure
//! folds under `crate::metrics`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Alias, Asterisk, Expr, Func, PostgresQueryBuilder, Query};
use sqlx::{PgPool, Row};

use crate::interfaces::{
    CallLogRow, LoadRow, LoadStatus, MetricSource, RateAverages, Result, ReviewResponseRow,
    VentureId,
};
use crate::storage::schema::{CallAgents, CallLogs, HotelKpiDaily, HotelReviews, Hotels, Loads};

pub struct PgMetricSource {
    pool: PgPool,
}

impl PgMetricSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricSource for PgMetricSource {
    async fn freight_loads(
        &self,
        venture_id: VentureId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LoadRow>> {
        let sql = Query::select()
            .columns([
                Loads::CreatedById,
                Loads::LoadStatus,
                Loads::BillAmount,
                Loads::Miles,
                Loads::MarginAmount,
            ])
            .from(Loads::Table)
            .and_where(Expr::col(Loads::VentureId).eq(venture_id))
            .and_where(Expr::col(Loads::BillingDate).gte(start.to_rfc3339()))
            .and_where(Expr::col(Loads::BillingDate).lte(end.to_rfc3339()))
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let status: String = row.try_get("load_status")?;
                Ok(LoadRow {
                    created_by: row.try_get("created_by_id")?,
                    status: LoadStatus::parse(&status),
                    bill_amount: row.try_get("bill_amount")?,
                    miles: row.try_get("miles")?,
                    margin_amount: row.try_get("margin_amount")?,
                })
            })
            .collect()
    }

    async fn call_logs(
        &self,
        venture_id: VentureId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CallLogRow>> {
        let sql = Query::select()
            .column((CallAgents::Table, CallAgents::UserId))
            .column((CallLogs::Table, CallLogs::DialCount))
            .column((CallLogs::Table, CallLogs::IsConnected))
            .column((CallLogs::Table, CallLogs::DealWon))
            .column((CallLogs::Table, CallLogs::CallStartedAt))
            .column((CallLogs::Table, CallLogs::CallEndedAt))
            .from(CallLogs::Table)
            .left_join(
                CallAgents::Table,
                Expr::col((CallLogs::Table, CallLogs::AgentId))
                    .equals((CallAgents::Table, CallAgents::Id)),
            )
            .and_where(Expr::col((CallLogs::Table, CallLogs::VentureId)).eq(venture_id))
            .and_where(Expr::col((CallLogs::Table, CallLogs::CallStartedAt)).gte(start.to_rfc3339()))
            .and_where(Expr::col((CallLogs::Table, CallLogs::CallStartedAt)).lte(end.to_rfc3339()))
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(CallLogRow {
                    user_id: row.try_get("user_id")?,
                    dial_count: row.try_get("dial_count")?,
                    connected: row.try_get("is_connected")?,
                    deal_won: row.try_get("deal_won")?,
                    started_at: row.try_get("call_started_at")?,
                    ended_at: row.try_get("call_ended_at")?,
                })
            })
            .collect()
    }

    async fn review_responses(
        &self,
        venture_id: VentureId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ReviewResponseRow>> {
        let sql = Query::select()
            .column((HotelReviews::Table, HotelReviews::RespondedById))
            .from(HotelReviews::Table)
            .inner_join(
                Hotels::Table,
                Expr::col((HotelReviews::Table, HotelReviews::HotelId))
                    .equals((Hotels::Table, Hotels::Id)),
            )
            .and_where(Expr::col((Hotels::Table, Hotels::VentureId)).eq(venture_id))
            .and_where(
                Expr::col((HotelReviews::Table, HotelReviews::RespondedById)).is_not_null(),
            )
            .and_where(
                Expr::col((HotelReviews::Table, HotelReviews::ReviewDate)).gte(start.to_rfc3339()),
            )
            .and_where(
                Expr::col((HotelReviews::Table, HotelReviews::ReviewDate)).lte(end.to_rfc3339()),
            )
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(ReviewResponseRow {
                    responded_by: row.try_get("responded_by_id")?,
                })
            })
            .collect()
    }

    async fn hotel_rate_averages(
        &self,
        venture_id: VentureId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RateAverages> {
        // Missing values count as zero: the divisor is the full row count,
        // not the count of non-null values, so AVG() is not usable here.
        let sql = Query::select()
            .expr_as(
                Func::sum(Func::coalesce([
                    Expr::col(HotelKpiDaily::Adr).into(),
                    Expr::val(0.0).into(),
                ])),
                Alias::new("adr_total"),
            )
            .expr_as(
                Func::sum(Func::coalesce([
                    Expr::col(HotelKpiDaily::Revpar).into(),
                    Expr::val(0.0).into(),
                ])),
                Alias::new("revpar_total"),
            )
            .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("row_count"))
            .from(HotelKpiDaily::Table)
            .and_where(Expr::col(HotelKpiDaily::VentureId).eq(venture_id))
            .and_where(Expr::col(HotelKpiDaily::Day).gte(start.date_naive().to_string()))
            .and_where(Expr::col(HotelKpiDaily::Day).lte(end.date_naive().to_string()))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        let adr_total: Option<f64> = row.try_get("adr_total")?;
        let revpar_total: Option<f64> = row.try_get("revpar_total")?;
        let row_count: i64 = row.try_get("row_count")?;
        Ok(rate_averages(adr_total, revpar_total, row_count))
    }
}

/// Zero-filled sums divided by the total row count. No rows means no
/// averages, not a division by zero.
fn rate_averages(adr_total: Option<f64>, revpar_total: Option<f64>, row_count: i64) -> RateAverages {
    if row_count <= 0 {
        return RateAverages::default();
    }
    RateAverages {
        adr: adr_total.unwrap_or(0.0) / row_count as f64,
        revpar: revpar_total.unwrap_or(0.0) / row_count as f64,
    }
}
