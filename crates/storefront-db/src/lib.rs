use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrate;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use storefront_core::AppConfig;
use thiserror::Error;

// Path relative to crates/storefront-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub statement_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
            statement_timeout_secs: 30,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
            statement_timeout_secs: config.db_statement_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Config(#[from] storefront_core::ConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

fn connect_options(database_url: &str, config: PoolConfig) -> Result<PgConnectOptions, sqlx::Error> {
    // Per-statement timeout applies to every query on every pooled connection.
    Ok(PgConnectOptions::from_str(database_url)?.options([(
        "statement_timeout",
        format!("{}s", config.statement_timeout_secs),
    )]))
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(connect_options(database_url, config)?)
        .await
}

/// Create a pool without dialing the database.
///
/// The server boots even when Postgres is down; `/health` reports `db_ready`
/// from a live ping instead.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the URL cannot be parsed.
pub fn connect_pool_lazy(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    Ok(PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_lazy_with(connect_options(database_url, config)?))
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    let applied_before = {
        let mut conn = pool.acquire().await?;
        conn.ensure_migrations_table().await?;
        conn.list_applied_migrations().await?.len()
    };

    MIGRATOR.run(pool).await?;

    let applied_after = {
        let mut conn = pool.acquire().await?;
        conn.ensure_migrations_table().await?;
        conn.list_applied_migrations().await?.len()
    };

    Ok(applied_after.saturating_sub(applied_before))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Run a full health check: ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}


pub mod baskets;
pub mod catalog;
pub mod stores;

pub use baskets::{
    clear_items, create_basket, delete_item, get_basket, get_item, list_items, mark_checked_out,
    set_checkout_url, set_item_quantity, touch_basket, upsert_item, BasketItemRow, BasketRow,
    NewBasketItem,
};
pub use catalog::{
    fetch_products, filter_products, find_by_handle, fts_store_probe, fuzzy_store_probe,
    lexical_candidates, product_type_counts, top_tags, total_products, vector_candidates,
    FilterParams, RankedId,
};
pub use stores::{
    get_store, latest_indexed_store_slug, list_stores, preferred_store_slug, StoreRow,
};
