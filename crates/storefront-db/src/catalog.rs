//! Catalog retrieval queries: store probes, lexical/vector candidate
//! generation, hydration, and structured filtering.

use sqlx::PgPool;
use storefront_core::ProductDoc;

use crate::DbError;

/// Excludes non-product catalog rows (collection/landing pages) from every
/// retrieval query. The persisted `is_catalog_product` flag is authoritative
/// when present; the URL-fragment / variants heuristic is the fallback.
const PRODUCT_ONLY_SQL: &str = "COALESCE(is_catalog_product, \
     lower(url) LIKE '%/products/%' \
     OR lower(url) LIKE '%/product/%' \
     OR (jsonb_typeof(data->'variants') = 'array' \
         AND jsonb_array_length(data->'variants') > 0))";

const PRODUCT_COLUMNS: &str = "product_id, handle, title, product_type, vendor, tags, \
     price_min, price_max, available, url, summary_short, summary_llm, \
     option_tokens, data";

/// A candidate id with its dense rank within one retrieval branch.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RankedId {
    pub product_id: String,
    pub rank: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRecord {
    product_id: String,
    handle: String,
    title: String,
    product_type: Option<String>,
    vendor: Option<String>,
    tags: Vec<String>,
    price_min: Option<i64>,
    price_max: Option<i64>,
    available: bool,
    url: String,
    summary_short: Option<String>,
    summary_llm: Option<String>,
    option_tokens: Vec<String>,
    data: serde_json::Value,
}

impl From<ProductRecord> for ProductDoc {
    fn from(record: ProductRecord) -> Self {
        ProductDoc {
            id: record.product_id,
            handle: record.handle,
            title: record.title,
            product_type: record.product_type,
            vendor: record.vendor,
            tags: record.tags,
            price_min: record.price_min,
            price_max: record.price_max,
            available: record.available,
            url: record.url,
            summary_short: record.summary_short,
            summary_llm: record.summary_llm,
            option_tokens: record.option_tokens,
            data: record.data,
        }
    }
}

/// Full-text store probe: the store whose catalog best matches the hint.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn fts_store_probe(pool: &PgPool, hint: &str) -> Result<Option<String>, DbError> {
    let slug = sqlx::query_scalar::<_, String>(&format!(
        "SELECT store_slug \
         FROM products \
         WHERE search_tsv @@ websearch_to_tsquery('simple', $1) \
           AND {PRODUCT_ONLY_SQL} \
         GROUP BY store_slug \
         ORDER BY COUNT(*) DESC, store_slug ASC \
         LIMIT 1"
    ))
    .bind(hint)
    .fetch_optional(pool)
    .await?;

    Ok(slug)
}

/// Fuzzy store probe: case-insensitive substring match over title, handle,
/// product type, and tags.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn fuzzy_store_probe(pool: &PgPool, hint: &str) -> Result<Option<String>, DbError> {
    let slug = sqlx::query_scalar::<_, String>(&format!(
        "SELECT store_slug \
         FROM products \
         WHERE (title ILIKE '%' || $1 || '%' \
                OR handle ILIKE '%' || $1 || '%' \
                OR COALESCE(product_type, '') ILIKE '%' || $1 || '%' \
                OR EXISTS ( \
                    SELECT 1 FROM unnest(tags) AS t(tag) \
                    WHERE t.tag ILIKE '%' || $1 || '%')) \
           AND {PRODUCT_ONLY_SQL} \
         GROUP BY store_slug \
         ORDER BY COUNT(*) DESC, store_slug ASC \
         LIMIT 1"
    ))
    .bind(hint)
    .fetch_optional(pool)
    .await?;

    Ok(slug)
}

/// Lexical candidates: `ts_rank_cd` ordering with dense `row_number` ranks,
/// deterministically tie-broken by product id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn lexical_candidates(
    pool: &PgPool,
    store_slug: &str,
    query: &str,
    limit: i64,
) -> Result<Vec<RankedId>, DbError> {
    let rows = sqlx::query_as::<_, RankedId>(&format!(
        "WITH ranked AS ( \
             SELECT product_id, \
                    ROW_NUMBER() OVER ( \
                        ORDER BY ts_rank_cd(search_tsv, websearch_to_tsquery('simple', $2)) DESC, \
                                 product_id \
                    ) AS rank \
             FROM products \
             WHERE store_slug = $1 \
               AND search_tsv @@ websearch_to_tsquery('simple', $2) \
               AND {PRODUCT_ONLY_SQL} \
             LIMIT $3 \
         ) \
         SELECT product_id, rank FROM ranked"
    ))
    .bind(store_slug)
    .bind(query)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Vector candidates by cosine distance against a pgvector literal.
///
/// Fails on clusters where the `embedding` column degraded to TEXT; callers
/// treat that as an empty vector branch.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn vector_candidates(
    pool: &PgPool,
    store_slug: &str,
    embedding_literal: &str,
    limit: i64,
) -> Result<Vec<RankedId>, DbError> {
    let rows = sqlx::query_as::<_, RankedId>(&format!(
        "SELECT product_id, \
                ROW_NUMBER() OVER (ORDER BY embedding <=> $2::vector, product_id) AS rank \
         FROM products \
         WHERE store_slug = $1 \
           AND embedding IS NOT NULL \
           AND {PRODUCT_ONLY_SQL} \
         ORDER BY embedding <=> $2::vector, product_id \
         LIMIT $3"
    ))
    .bind(store_slug)
    .bind(embedding_literal)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Hydrates full product documents for a candidate id set. Row order is not
/// meaningful; callers re-order by fused rank.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn fetch_products(
    pool: &PgPool,
    store_slug: &str,
    product_ids: &[String],
) -> Result<Vec<ProductDoc>, DbError> {
    if product_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, ProductRecord>(&format!(
        "SELECT {PRODUCT_COLUMNS} \
         FROM products \
         WHERE store_slug = $1 \
           AND product_id = ANY($2::TEXT[]) \
           AND {PRODUCT_ONLY_SQL}"
    ))
    .bind(store_slug)
    .bind(product_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ProductDoc::from).collect())
}

/// Looks up a single product by its per-store handle.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_by_handle(
    pool: &PgPool,
    store_slug: &str,
    handle: &str,
) -> Result<Option<ProductDoc>, DbError> {
    let row = sqlx::query_as::<_, ProductRecord>(&format!(
        "SELECT {PRODUCT_COLUMNS} \
         FROM products \
         WHERE store_slug = $1 AND handle = $2 \
           AND {PRODUCT_ONLY_SQL} \
         LIMIT 1"
    ))
    .bind(store_slug)
    .bind(handle)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(ProductDoc::from))
}

/// Structured filter inputs for [`filter_products`]. Prices are integer cents.
#[derive(Debug, Clone, Default)]
pub struct FilterParams<'a> {
    pub product_type: Option<&'a str>,
    pub tags: Vec<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub available_only: bool,
    pub limit: i64,
}

/// Candidate rows for structured filtering, ordered by product id. Option
/// matching happens in the caller, so the limit here is a generous superset.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn filter_products(
    pool: &PgPool,
    store_slug: &str,
    params: &FilterParams<'_>,
) -> Result<Vec<ProductDoc>, DbError> {
    let tags = (!params.tags.is_empty()).then_some(&params.tags);

    let rows = sqlx::query_as::<_, ProductRecord>(&format!(
        "SELECT {PRODUCT_COLUMNS} \
         FROM products \
         WHERE store_slug = $1 \
           AND {PRODUCT_ONLY_SQL} \
           AND ($2::TEXT IS NULL OR lower(COALESCE(product_type, '')) = lower($2)) \
           AND ($3::TEXT[] IS NULL OR tags @> $3) \
           AND ($4::BIGINT IS NULL OR COALESCE(price_max, price_min, 0) >= $4) \
           AND ($5::BIGINT IS NULL OR COALESCE(price_min, price_max, 0) <= $5) \
           AND (NOT $6 OR available = TRUE) \
         ORDER BY product_id \
         LIMIT $7"
    ))
    .bind(store_slug)
    .bind(params.product_type)
    .bind(tags)
    .bind(params.min_price)
    .bind(params.max_price)
    .bind(params.available_only)
    .bind((params.limit * 15).max(200))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ProductDoc::from).collect())
}

/// Product types with counts, most common first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn product_type_counts(
    pool: &PgPool,
    store_slug: &str,
) -> Result<Vec<(String, i64)>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(&format!(
        "SELECT product_type, COUNT(*) AS count \
         FROM products \
         WHERE store_slug = $1 \
           AND product_type IS NOT NULL AND product_type <> '' \
           AND {PRODUCT_ONLY_SQL} \
         GROUP BY product_type \
         ORDER BY count DESC, product_type ASC"
    ))
    .bind(store_slug)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// The most frequent tags in a store's catalog.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn top_tags(
    pool: &PgPool,
    store_slug: &str,
    limit: i64,
) -> Result<Vec<(String, i64)>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(&format!(
        "SELECT tag, COUNT(*) AS count \
         FROM ( \
             SELECT unnest(tags) AS tag \
             FROM products \
             WHERE store_slug = $1 \
               AND {PRODUCT_ONLY_SQL} \
         ) t \
         WHERE tag IS NOT NULL AND tag <> '' \
         GROUP BY tag \
         ORDER BY count DESC, tag ASC \
         LIMIT $2"
    ))
    .bind(store_slug)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Total catalog products for a store.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn total_products(pool: &PgPool, store_slug: &str) -> Result<i64, DbError> {
    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM products WHERE store_slug = $1 AND {PRODUCT_ONLY_SQL}"
    ))
    .bind(store_slug)
    .fetch_one(pool)
    .await?;

    Ok(total)
}
