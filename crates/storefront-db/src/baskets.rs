//! Persistence for baskets and their line items.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `baskets` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BasketRow {
    pub basket_id: String,
    pub store_slug: String,
    pub status: String,
    pub checkout_url: Option<String>,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BasketRow {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// A row from the `basket_items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BasketItemRow {
    pub basket_id: String,
    pub variant_id: String,
    pub handle: String,
    pub title: String,
    pub product_url: String,
    pub options: serde_json::Value,
    pub unit_price: i64,
    pub quantity: i32,
    pub available: bool,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot fields captured when a line is added or refreshed.
#[derive(Debug, Clone)]
pub struct NewBasketItem {
    pub basket_id: String,
    pub variant_id: String,
    pub handle: String,
    pub title: String,
    pub product_url: String,
    pub options: serde_json::Value,
    pub unit_price: i64,
    pub quantity: i32,
    pub available: bool,
}

const BASKET_COLUMNS: &str =
    "basket_id, store_slug, status, checkout_url, checked_out_at, created_at, updated_at";

const ITEM_COLUMNS: &str = "basket_id, variant_id, handle, title, product_url, options, \
     unit_price, quantity, available, added_at, updated_at";

/// Inserts a fresh basket pinned to one store.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (e.g. id collision).
pub async fn create_basket(
    pool: &PgPool,
    basket_id: &str,
    store_slug: &str,
) -> Result<BasketRow, DbError> {
    let row = sqlx::query_as::<_, BasketRow>(&format!(
        "INSERT INTO baskets (basket_id, store_slug) \
         VALUES ($1, $2) \
         RETURNING {BASKET_COLUMNS}"
    ))
    .bind(basket_id)
    .bind(store_slug)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetches a basket header by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_basket(pool: &PgPool, basket_id: &str) -> Result<Option<BasketRow>, DbError> {
    let row = sqlx::query_as::<_, BasketRow>(&format!(
        "SELECT {BASKET_COLUMNS} FROM baskets WHERE basket_id = $1"
    ))
    .bind(basket_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Lines in stable order: oldest first, variant id as tiebreaker.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_items(pool: &PgPool, basket_id: &str) -> Result<Vec<BasketItemRow>, DbError> {
    let rows = sqlx::query_as::<_, BasketItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} \
         FROM basket_items \
         WHERE basket_id = $1 \
         ORDER BY added_at ASC, variant_id ASC"
    ))
    .bind(basket_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetches one line by its `(basket_id, variant_id)` key.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_item(
    pool: &PgPool,
    basket_id: &str,
    variant_id: &str,
) -> Result<Option<BasketItemRow>, DbError> {
    let row = sqlx::query_as::<_, BasketItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} \
         FROM basket_items \
         WHERE basket_id = $1 AND variant_id = $2"
    ))
    .bind(basket_id)
    .bind(variant_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Upserts a line on `(basket_id, variant_id)`: conflicts accumulate the
/// quantity (clamped to 99) and refresh the snapshot fields.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_item(pool: &PgPool, item: &NewBasketItem) -> Result<BasketItemRow, DbError> {
    let row = sqlx::query_as::<_, BasketItemRow>(&format!(
        "INSERT INTO basket_items \
             (basket_id, variant_id, handle, title, product_url, options, \
              unit_price, quantity, available) \
         VALUES ($1, $2, $3, $4, $5, $6::jsonb, $7, $8, $9) \
         ON CONFLICT (basket_id, variant_id) DO UPDATE SET \
             handle      = EXCLUDED.handle, \
             title       = EXCLUDED.title, \
             product_url = EXCLUDED.product_url, \
             options     = EXCLUDED.options, \
             unit_price  = EXCLUDED.unit_price, \
             quantity    = LEAST(basket_items.quantity + EXCLUDED.quantity, 99), \
             available   = EXCLUDED.available, \
             updated_at  = NOW() \
         RETURNING {ITEM_COLUMNS}"
    ))
    .bind(&item.basket_id)
    .bind(&item.variant_id)
    .bind(&item.handle)
    .bind(&item.title)
    .bind(&item.product_url)
    .bind(&item.options)
    .bind(item.unit_price)
    .bind(item.quantity)
    .bind(item.available)
    .fetch_one(pool)
    .await?;

    touch_basket(pool, &item.basket_id).await?;

    Ok(row)
}

/// Sets an existing line's quantity. Returns `false` when the line is absent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_item_quantity(
    pool: &PgPool,
    basket_id: &str,
    variant_id: &str,
    quantity: i32,
) -> Result<bool, DbError> {
    let rows_affected = sqlx::query(
        "UPDATE basket_items \
         SET quantity = $3, updated_at = NOW() \
         WHERE basket_id = $1 AND variant_id = $2",
    )
    .bind(basket_id)
    .bind(variant_id)
    .bind(quantity)
    .execute(pool)
    .await?
    .rows_affected();

    if rows_affected > 0 {
        touch_basket(pool, basket_id).await?;
    }

    Ok(rows_affected > 0)
}

/// Deletes one line. Returns `false` when the line is absent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_item(
    pool: &PgPool,
    basket_id: &str,
    variant_id: &str,
) -> Result<bool, DbError> {
    let rows_affected = sqlx::query(
        "DELETE FROM basket_items WHERE basket_id = $1 AND variant_id = $2",
    )
    .bind(basket_id)
    .bind(variant_id)
    .execute(pool)
    .await?
    .rows_affected();

    if rows_affected > 0 {
        touch_basket(pool, basket_id).await?;
    }

    Ok(rows_affected > 0)
}

/// Deletes every line in a basket. Returns the number of removed lines.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn clear_items(pool: &PgPool, basket_id: &str) -> Result<u64, DbError> {
    let rows_affected = sqlx::query("DELETE FROM basket_items WHERE basket_id = $1")
        .bind(basket_id)
        .execute(pool)
        .await?
        .rows_affected();

    touch_basket(pool, basket_id).await?;

    Ok(rows_affected)
}

/// Bumps a basket's `updated_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn touch_basket(pool: &PgPool, basket_id: &str) -> Result<(), DbError> {
    sqlx::query("UPDATE baskets SET updated_at = NOW() WHERE basket_id = $1")
        .bind(basket_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persists the synthesized checkout URL on the basket.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_checkout_url(
    pool: &PgPool,
    basket_id: &str,
    checkout_url: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE baskets SET checkout_url = $2, updated_at = NOW() WHERE basket_id = $1",
    )
    .bind(basket_id)
    .bind(checkout_url)
    .execute(pool)
    .await?;
    Ok(())
}

/// Transitions a basket to `checked_out`, stamping `checked_out_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_checked_out(pool: &PgPool, basket_id: &str) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE baskets \
         SET status = 'checked_out', checked_out_at = NOW(), updated_at = NOW() \
         WHERE basket_id = $1",
    )
    .bind(basket_id)
    .execute(pool)
    .await?;
    Ok(())
}
