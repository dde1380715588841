//! PostgreSQL venture / plan / rule reads.

use std::str::FromStr;

use async_trait::async_trait;
use sea_query::{Expr, Order, PostgresQueryBuilder, Query};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::interfaces::{
    MembershipStore, Plan, PlanId, PlanStore, Result, StorageError, UserId, Venture, VentureId,
};
use crate::metrics::MetricKey;
use crate::rules::{CalcType, IncentiveRule, RuleConfig};
use crate::storage::schema::{IncentivePlans, IncentiveRules, VentureMembers, Ventures};

pub struct PgPlanStore {
    pool: PgPool,
}

impl PgPlanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_rule(row: &PgRow) -> Result<IncentiveRule> {
        let metric_key: String = row.try_get("metric_key")?;
        let metric_key = MetricKey::from_str(&metric_key)
            .map_err(|err| StorageError::Invalid(err.to_string()))?;
        let calc_type: String = row.try_get("calc_type")?;
        let config: serde_json::Value = row.try_get("config")?;
        let config: RuleConfig = serde_json::from_value(config)?;

        Ok(IncentiveRule {
            id: row.try_get("id")?,
            plan_id: row.try_get("plan_id")?,
            metric_key,
            calc_type: CalcType::parse(&calc_type),
            rate: row.try_get("rate")?,
            config,
            is_enabled: row.try_get("is_enabled")?,
        })
    }
}

#[async_trait]
impl PlanStore for PgPlanStore {
    async fn active_ventures(&self) -> Result<Vec<Venture>> {
        let sql = Query::select()
            .columns([Ventures::Id, Ventures::Name])
            .from(Ventures::Table)
            .and_where(Expr::col(Ventures::IsActive).eq(true))
            .order_by(Ventures::Id, Order::Asc)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(Venture {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    async fn venture(&self, venture_id: VentureId) -> Result<Option<Venture>> {
        let sql = Query::select()
            .columns([Ventures::Id, Ventures::Name])
            .from(Ventures::Table)
            .and_where(Expr::col(Ventures::Id).eq(venture_id))
            .and_where(Expr::col(Ventures::IsActive).eq(true))
            .to_string(PostgresQueryBuilder);

        match sqlx::query(&sql).fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(Venture {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            })),
            None => Ok(None),
        }
    }

    async fn active_plans(&self, venture_id: VentureId) -> Result<Vec<Plan>> {
        let sql = Query::select()
            .columns([IncentivePlans::Id, IncentivePlans::VentureId, IncentivePlans::Name])
            .from(IncentivePlans::Table)
            .and_where(Expr::col(IncentivePlans::VentureId).eq(venture_id))
            .and_where(Expr::col(IncentivePlans::IsActive).eq(true))
            .order_by(IncentivePlans::Id, Order::Asc)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(Plan {
                    id: row.try_get("id")?,
                    venture_id: row.try_get("venture_id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    async fn plan(&self, plan_id: PlanId) -> Result<Option<Plan>> {
        let sql = Query::select()
            .columns([IncentivePlans::Id, IncentivePlans::VentureId, IncentivePlans::Name])
            .from(IncentivePlans::Table)
            .and_where(Expr::col(IncentivePlans::Id).eq(plan_id))
            .to_string(PostgresQueryBuilder);

        match sqlx::query(&sql).fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(Plan {
                id: row.try_get("id")?,
                venture_id: row.try_get("venture_id")?,
                name: row.try_get("name")?,
            })),
            None => Ok(None),
        }
    }

    async fn enabled_rules(&self, plan_id: PlanId) -> Result<Vec<IncentiveRule>> {
        let sql = Query::select()
            .columns([
                IncentiveRules::Id,
                IncentiveRules::PlanId,
                IncentiveRules::MetricKey,
                IncentiveRules::CalcType,
                IncentiveRules::Rate,
                IncentiveRules::Config,
                IncentiveRules::IsEnabled,
            ])
            .from(IncentiveRules::Table)
            .and_where(Expr::col(IncentiveRules::PlanId).eq(plan_id))
            .and_where(Expr::col(IncentiveRules::IsEnabled).eq(true))
            .order_by(IncentiveRules::Id, Order::Asc)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_rule).collect()
    }
}

pub struct PgMembershipStore {
    pool: PgPool,
}

impl PgMembershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for PgMembershipStore {
    async fn member_user_ids(&self, venture_id: VentureId) -> Result<Vec<UserId>> {
        let sql = Query::select()
            .column(VentureMembers::UserId)
            .from(VentureMembers::Table)
            .and_where(Expr::col(VentureMembers::VentureId).eq(venture_id))
            .order_by(VentureMembers::UserId, Order::Asc)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(|row| Ok(row.try_get("user_id")?)).collect()
    }
}
