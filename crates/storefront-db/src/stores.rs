//! Queries against the `stores` tenant table (read-only; the indexer owns writes).

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `stores` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoreRow {
    pub slug: String,
    pub store_name: String,
    pub url: String,
    pub platform: String,
    pub product_count: i32,
    pub indexed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Lists stores for routing, busiest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_stores(pool: &PgPool, limit: i64) -> Result<Vec<StoreRow>, DbError> {
    let rows = sqlx::query_as::<_, StoreRow>(
        "SELECT slug, store_name, url, platform, product_count, indexed_at, last_error \
         FROM stores \
         ORDER BY product_count DESC, indexed_at DESC NULLS LAST, slug ASC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetches one store by slug.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_store(pool: &PgPool, slug: &str) -> Result<Option<StoreRow>, DbError> {
    let row = sqlx::query_as::<_, StoreRow>(
        "SELECT slug, store_name, url, platform, product_count, indexed_at, last_error \
         FROM stores \
         WHERE slug = $1",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// The store with the most indexed products (ties: most recently indexed,
/// then lexicographic slug). `None` when no store has any products.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn preferred_store_slug(pool: &PgPool) -> Result<Option<String>, DbError> {
    let slug = sqlx::query_scalar::<_, String>(
        "SELECT slug \
         FROM stores \
         WHERE product_count > 0 \
         ORDER BY product_count DESC, indexed_at DESC NULLS LAST, slug ASC \
         LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(slug)
}

/// The most recently indexed store overall, regardless of product count.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_indexed_store_slug(pool: &PgPool) -> Result<Option<String>, DbError> {
    let slug = sqlx::query_scalar::<_, String>(
        "SELECT slug \
         FROM stores \
         ORDER BY indexed_at DESC NULLS LAST, slug ASC \
         LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(slug)
}
