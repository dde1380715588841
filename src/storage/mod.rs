//! Storage backends.
//!
//! `postgres` holds the production implementations of the interfaces in
//! `crate::interfaces`; `mock` holds in-memory doubles for tests. `schema`
//! carries the sea-query identifiers and the DDL for the tables this crate
//! owns.

pub mod mock;
pub mod postgres;
pub mod schema;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::interfaces::Result;

/// Open a connection pool against the configured database.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    info!(max_connections = config.max_connections, "connected to database");
    Ok(pool)
}

/// Create the tables this crate owns (ledger, run log, lock fallback).
/// Domain tables belong to the surrounding application and are not touched.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(schema::CREATE_LEDGER_TABLE).execute(pool).await?;
    sqlx::raw_sql(schema::CREATE_RUN_LOG_TABLE).execute(pool).await?;
    sqlx::raw_sql(schema::CREATE_LOCK_TABLE).execute(pool).await?;
    Ok(())
}

/// Create the minimal domain-table shapes. Integration tests and local
/// bootstrap only.
pub async fn init_domain_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(schema::CREATE_DOMAIN_TABLES).execute(pool).await?;
    Ok(())
}
