//! Store-slug resolution: explicit argument, request scope, then a
//! query-driven database probe cascade.

use sqlx::PgPool;

use crate::tools::context;
use crate::tools::error::ToolError;

/// Resolve the target store for a tool call.
///
/// Cascade, first non-empty result wins:
/// 1. the explicit `slug` argument, trimmed
/// 2. the request-scoped slug installed by the dispatcher
/// 3. full-text probe on the query hint (most matching products wins)
/// 4. fuzzy probe on the query hint
/// 5. the store with the highest product count
/// 6. the most recently indexed store
///
/// Hint-probe failures are swallowed and fall through to the next tier.
///
/// # Errors
///
/// Returns [`ToolError::NoIndexedStores`] when every tier comes up empty, or
/// [`ToolError::Db`] if the store-table fallbacks fail outright.
pub async fn resolve_store_slug(
    pool: &PgPool,
    slug_arg: Option<&str>,
    query_hint: Option<&str>,
) -> Result<String, ToolError> {
    if let Some(explicit) = slug_arg.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(explicit.to_string());
    }

    if let Some(scoped) = context::current_store_slug() {
        let scoped = scoped.trim();
        if !scoped.is_empty() {
            return Ok(scoped.to_string());
        }
    }

    if let Some(hint) = query_hint.map(str::trim).filter(|h| !h.is_empty()) {
        match storefront_db::fts_store_probe(pool, hint).await {
            Ok(Some(slug)) => return Ok(slug),
            Ok(None) => {}
            Err(error) => {
                tracing::debug!(error = %error, hint, "full-text store probe failed; falling through");
            }
        }

        match storefront_db::fuzzy_store_probe(pool, hint).await {
            Ok(Some(slug)) => return Ok(slug),
            Ok(None) => {}
            Err(error) => {
                tracing::debug!(error = %error, hint, "fuzzy store probe failed; falling through");
            }
        }
    }

    if let Some(slug) = storefront_db::preferred_store_slug(pool).await? {
        return Ok(slug);
    }

    if let Some(slug) = storefront_db::latest_indexed_store_slug(pool).await? {
        return Ok(slug);
    }

    Err(ToolError::NoIndexedStores)
}
