//! Legacy hybrid search: lexical + vector candidates fused with RRF.

use std::collections::HashMap;
use std::time::Instant;

use serde::Deserialize;
use serde_json::{json, Value};
use storefront_core::{format_payload, ProductDoc};
use storefront_search::{embedding_literal, fuse, SearchError, ToneBucket};

use crate::app::AppState;
use crate::tools::error::ToolError;
use crate::tools::parse_args;
use crate::tools::search_v2;
use crate::tools::slug::resolve_store_slug;

fn default_max_results() -> i64 {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: i64,
    #[serde(default = "default_true")]
    available_only: bool,
    #[serde(default)]
    slug: Option<String>,
}

pub async fn search_products(state: &AppState, arguments: Value) -> Result<Value, ToolError> {
    let args: SearchArgs = parse_args(arguments)?;
    let query = args.query.trim().to_string();
    if query.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }

    let store_slug = resolve_store_slug(&state.pool, args.slug.as_deref(), Some(&query)).await?;
    let limit = args.max_results.clamp(1, 50) as usize;

    let cache_key = format!(
        "v1|{store_slug}|{}|{limit}|{}",
        query.to_lowercase(),
        args.available_only
    );
    if let Some(cached) = state.search_cache.get(&cache_key) {
        return Ok(cached);
    }

    let candidate_limit = (limit as i64 * 10).max(120);
    let retrieval = fused_candidates(
        state,
        &store_slug,
        &query,
        candidate_limit,
        (limit * 5).max(limit),
    )
    .await?;

    let mut results = Vec::new();
    for (doc, score) in retrieval.candidates {
        if args.available_only && !doc.available {
            continue;
        }
        let mut summary = doc.summary(Some(score));
        summary["store_slug"] = json!(store_slug);
        results.push(summary);
        if results.len() >= limit {
            break;
        }
    }

    let payload = format_payload(Value::Array(results), &["tags"]);
    state.search_cache.set(&cache_key, payload.clone());

    maybe_shadow_sample(state, &query, limit, args.available_only, &store_slug, &payload).await;

    Ok(payload)
}

/// With the configured probability, run the v2 path for the same query and
/// log a comparison. Never affects the legacy response.
async fn maybe_shadow_sample(
    state: &AppState,
    query: &str,
    limit: usize,
    available_only: bool,
    store_slug: &str,
    legacy_payload: &Value,
) {
    if !state.v2_enabled || state.shadow_sample_rate <= 0.0 {
        return;
    }
    if rand::random::<f64>() >= state.shadow_sample_rate {
        return;
    }

    let request = search_v2::V2Request {
        query: query.to_string(),
        limit: limit.min(8) as i64,
        available_only,
        budget_min_cents: None,
        budget_max_cents: None,
        skin_tone: ToneBucket::infer_from_query(query).map(|bucket| bucket.as_str().to_string()),
        sort: None,
        slug: Some(store_slug.to_string()),
    };

    let legacy_count = legacy_payload.as_array().map_or(0, Vec::len);
    match search_v2::run(state, request).await {
        Ok(v2_payload) => {
            let v2_count = v2_payload["results"].as_array().map_or(0, Vec::len);
            tracing::info!(
                query,
                store_slug,
                legacy_count,
                v2_count,
                "v2 shadow sample comparison"
            );
        }
        Err(error) => {
            tracing::debug!(error = %error, query, "v2 shadow sample failed");
        }
    }
}

/// One hybrid retrieval pass: lexical and vector branches issued
/// concurrently, fused with RRF, hydrated in fused order.
pub(crate) struct FusedRetrieval {
    pub candidates: Vec<(ProductDoc, f64)>,
    pub embed_ms: u128,
    pub db_ms: u128,
}

pub(crate) async fn fused_candidates(
    state: &AppState,
    store_slug: &str,
    query: &str,
    candidate_limit: i64,
    fuse_limit: usize,
) -> Result<FusedRetrieval, ToolError> {
    let db_started = Instant::now();

    let lexical_branch =
        storefront_db::lexical_candidates(&state.pool, store_slug, query, candidate_limit);

    let vector_branch = async {
        if !state.embedder.enabled() {
            return (Vec::new(), 0u128);
        }

        let embed_started = Instant::now();
        let embedding = match embed_cached(state, query).await {
            Ok(embedding) => embedding,
            Err(error) => {
                tracing::warn!(error = %error, query, "embedding failed; degrading to lexical-only");
                return (Vec::new(), embed_started.elapsed().as_millis());
            }
        };
        let embed_ms = embed_started.elapsed().as_millis();

        let literal = embedding_literal(&embedding);
        match storefront_db::vector_candidates(&state.pool, store_slug, &literal, candidate_limit)
            .await
        {
            Ok(rows) => (
                rows.into_iter()
                    .map(|row| (row.product_id, row.rank))
                    .collect(),
                embed_ms,
            ),
            Err(error) => {
                tracing::warn!(error = %error, query, "vector probe failed; degrading to lexical-only");
                (Vec::new(), embed_ms)
            }
        }
    };

    let (lexical, (vector_ranked, embed_ms)) = tokio::join!(lexical_branch, vector_branch);
    let lexical_ranked: Vec<(String, i64)> = lexical?
        .into_iter()
        .map(|row| (row.product_id, row.rank))
        .collect();

    let fused = fuse(&[vector_ranked, lexical_ranked], fuse_limit);

    let ids: Vec<String> = fused.iter().map(|(id, _)| id.clone()).collect();
    let hydrated = storefront_db::fetch_products(&state.pool, store_slug, &ids).await?;
    let db_ms = db_started.elapsed().as_millis();

    let mut by_id: HashMap<String, ProductDoc> = hydrated
        .into_iter()
        .map(|doc| (doc.id.clone(), doc))
        .collect();
    // Preserve fused order; ids that failed to hydrate are skipped.
    let candidates = fused
        .into_iter()
        .filter_map(|(id, score)| by_id.remove(&id).map(|doc| (doc, score)))
        .collect();

    Ok(FusedRetrieval {
        candidates,
        embed_ms,
        db_ms,
    })
}

/// Cache-fronted query embedding, keyed by the trimmed query text.
async fn embed_cached(state: &AppState, query: &str) -> Result<Vec<f32>, SearchError> {
    let key = query.trim().to_string();
    if let Some(vector) = state.embed_cache.get(&key) {
        return Ok(vector);
    }
    let vector = state.embedder.embed_query(query).await?;
    state.embed_cache.set(&key, vector.clone());
    Ok(vector)
}
