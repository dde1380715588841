//! PostgreSQL-backed incentive ledger.

use async_trait::async_trait;
use chrono::NaiveDate;
use sea_query::{Expr, Order, PostgresQueryBuilder, Query};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};
use tracing::debug;

use crate::interfaces::{
    Breakdown, LedgerEntry, LedgerStore, NewLedgerEntry, Result, UserId, VentureId,
};
use crate::storage::schema::IncentiveDaily;

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &PgRow) -> Result<LedgerEntry> {
        let breakdown: serde_json::Value = row.try_get("breakdown")?;
        Ok(LedgerEntry {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            venture_id: row.try_get("venture_id")?,
            day: row.try_get("day")?,
            amount: row.try_get("amount")?,
            currency: row.try_get("currency")?,
            breakdown: serde_json::from_value(breakdown)?,
        })
    }

    fn insert_sql(entry: &NewLedgerEntry) -> Result<String> {
        let breakdown = serde_json::to_string(&entry.breakdown)?;
        Ok(Query::insert()
            .into_table(IncentiveDaily::Table)
            .columns([
                IncentiveDaily::UserId,
                IncentiveDaily::VentureId,
                IncentiveDaily::Day,
                IncentiveDaily::Amount,
                IncentiveDaily::Currency,
                IncentiveDaily::Breakdown,
            ])
            .values_panic([
                entry.user_id.into(),
                entry.venture_id.into(),
                entry.day.to_string().into(),
                entry.amount.into(),
                entry.currency.as_str().into(),
                breakdown.into(),
            ])
            .returning_col(IncentiveDaily::Id)
            .to_string(PostgresQueryBuilder))
    }

    fn delete_day_sql(venture_id: VentureId, day: NaiveDate) -> String {
        Query::delete()
            .from_table(IncentiveDaily::Table)
            .and_where(Expr::col(IncentiveDaily::VentureId).eq(venture_id))
            .and_where(Expr::col(IncentiveDaily::Day).eq(day.to_string()))
            .to_string(PostgresQueryBuilder)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find_entry(
        &self,
        user_id: UserId,
        venture_id: VentureId,
        day: NaiveDate,
    ) -> Result<Option<LedgerEntry>> {
        let sql = Query::select()
            .columns([
                IncentiveDaily::Id,
                IncentiveDaily::UserId,
                IncentiveDaily::VentureId,
                IncentiveDaily::Day,
                IncentiveDaily::Amount,
                IncentiveDaily::Currency,
                IncentiveDaily::Breakdown,
            ])
            .from(IncentiveDaily::Table)
            .and_where(Expr::col(IncentiveDaily::UserId).eq(user_id))
            .and_where(Expr::col(IncentiveDaily::VentureId).eq(venture_id))
            .and_where(Expr::col(IncentiveDaily::Day).eq(day.to_string()))
            .to_string(PostgresQueryBuilder);

        match sqlx::query(&sql).fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(Self::row_to_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_entry(&self, entry: NewLedgerEntry) -> Result<i64> {
        let sql = Self::insert_sql(&entry)?;
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(row.try_get("id")?)
    }

    async fn update_entry(&self, id: i64, amount: f64, breakdown: &Breakdown) -> Result<()> {
        let json = serde_json::to_string(breakdown)?;
        let sql = Query::update()
            .table(IncentiveDaily::Table)
            .value(IncentiveDaily::Amount, amount)
            .value(IncentiveDaily::Breakdown, json)
            .and_where(Expr::col(IncentiveDaily::Id).eq(id))
            .to_string(PostgresQueryBuilder);
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_day(&self, venture_id: VentureId, day: NaiveDate) -> Result<u64> {
        let sql = Self::delete_day_sql(venture_id, day);
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn replace_day(
        &self,
        venture_id: VentureId,
        day: NaiveDate,
        entries: Vec<NewLedgerEntry>,
    ) -> Result<(u64, u64)> {
        let mut tx: sqlx::Transaction<'_, Postgres> = self.pool.begin().await?;

        let delete = Self::delete_day_sql(venture_id, day);
        let deleted = sqlx::query(&delete).execute(&mut *tx).await?.rows_affected();

        let mut inserted = 0u64;
        for entry in &entries {
            let sql = Self::insert_sql(entry)?;
            sqlx::query(&sql).execute(&mut *tx).await?;
            inserted += 1;
        }

        tx.commit().await?;
        debug!(venture_id, %day, deleted, inserted, "replaced ledger day");
        Ok((deleted, inserted))
    }

    async fn entries_for_day(
        &self,
        venture_id: VentureId,
        day: NaiveDate,
    ) -> Result<Vec<LedgerEntry>> {
        let sql = Query::select()
            .columns([
                IncentiveDaily::Id,
                IncentiveDaily::UserId,
                IncentiveDaily::VentureId,
                IncentiveDaily::Day,
                IncentiveDaily::Amount,
                IncentiveDaily::Currency,
                IncentiveDaily::Breakdown,
            ])
            .from(IncentiveDaily::Table)
            .and_where(Expr::col(IncentiveDaily::VentureId).eq(venture_id))
            .and_where(Expr::col(IncentiveDaily::Day).eq(day.to_string()))
            .order_by(IncentiveDaily::UserId, Order::Asc)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_entry).collect()
    }
}
