//! V2 search: hybrid retrieval re-scored with budget, availability, and
//! shade-tone signals, capped to a strict payload budget, and cached.

use std::time::Instant;

use serde::Deserialize;
use serde_json::{json, Value};
use storefront_core::format_payload;
use storefront_search::{
    cap_results, rank_candidates, result_value, RankRequest, SortMode, ToneBucket,
    MAX_PAYLOAD_BYTES,
};

use crate::app::AppState;
use crate::tools::error::{error_payload, ToolError};
use crate::tools::parse_args;
use crate::tools::search::fused_candidates;
use crate::tools::slug::resolve_store_slug;

fn default_limit() -> i64 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchV2Args {
    query: String,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default = "default_true")]
    available_only: bool,
    #[serde(default)]
    budget_min_cents: Option<i64>,
    #[serde(default)]
    budget_max_cents: Option<i64>,
    #[serde(default)]
    skin_tone: Option<String>,
    #[serde(default)]
    sort: Option<String>,
    #[serde(default)]
    slug: Option<String>,
}

/// Internal request form, shared with the legacy path's shadow sampling.
pub(crate) struct V2Request {
    pub query: String,
    pub limit: i64,
    pub available_only: bool,
    pub budget_min_cents: Option<i64>,
    pub budget_max_cents: Option<i64>,
    pub skin_tone: Option<String>,
    pub sort: Option<String>,
    pub slug: Option<String>,
}

pub async fn search_products_v2(state: &AppState, arguments: Value) -> Result<Value, ToolError> {
    if !state.v2_enabled {
        return Ok(error_payload(
            "v2_disabled",
            "search_products_v2 is disabled; set MCP_V2_ENABLED to enable it",
        ));
    }

    let args: SearchV2Args = parse_args(arguments)?;
    run(
        state,
        V2Request {
            query: args.query,
            limit: args.limit,
            available_only: args.available_only,
            budget_min_cents: args.budget_min_cents,
            budget_max_cents: args.budget_max_cents,
            skin_tone: args.skin_tone,
            sort: args.sort,
            slug: args.slug,
        },
    )
    .await
}

pub(crate) async fn run(state: &AppState, request: V2Request) -> Result<Value, ToolError> {
    let total_started = Instant::now();

    let query = request.query.trim().to_string();
    let limit = request.limit.clamp(1, 8) as usize;
    let sort = SortMode::parse(request.sort.as_deref().unwrap_or(""));
    let tone_raw = request
        .skin_tone
        .as_deref()
        .map(|tone| tone.trim().to_lowercase())
        .unwrap_or_default();
    let tone = (!tone_raw.is_empty())
        .then(|| ToneBucket::from_request(&tone_raw))
        .flatten();

    if query.is_empty() {
        return Ok(json!({
            "query": "",
            "results": [],
            "excluded_counts": { "unavailable": 0, "over_budget": 0, "low_relevance": 0 },
            "truncated": false,
            "cache_hit": false,
            "sort": sort.as_str(),
            "limit": limit,
        }));
    }

    let store_slug = resolve_store_slug(&state.pool, request.slug.as_deref(), Some(&query)).await?;

    let cache_key = format!(
        "v2|{store_slug}|{}|{limit}|{}|{:?}|{:?}|{tone_raw}|{}",
        query.to_lowercase(),
        request.available_only,
        request.budget_max_cents,
        request.budget_min_cents,
        sort.as_str(),
    );
    if let Some(mut cached) = state.search_cache.get(&cache_key) {
        // The cache holds the canonical response; every read gets its own copy.
        cached["cache_hit"] = json!(true);
        return Ok(cached);
    }

    let candidate_limit = (limit as i64 * 20).max(100);
    let retrieval =
        fused_candidates(state, &store_slug, &query, candidate_limit, candidate_limit as usize)
            .await?;
    let embed_ms = retrieval.embed_ms;
    let db_ms = retrieval.db_ms;

    let rank_started = Instant::now();
    let rank_request = RankRequest {
        budget_min_cents: request.budget_min_cents,
        budget_max_cents: request.budget_max_cents,
        tone,
        available_only: request.available_only,
        sort,
        limit,
    };
    let (scored, excluded) = rank_candidates(retrieval.candidates, &rank_request);
    let results: Vec<Value> = scored
        .iter()
        .enumerate()
        .map(|(index, product)| result_value(product, index + 1, &rank_request, &store_slug))
        .collect();
    let rank_ms = rank_started.elapsed().as_millis();

    let serialize_started = Instant::now();
    // Results are normalized through the payload formatter; the envelope is
    // assembled afterwards so the exclusion counters stay integers.
    let normalized_results = format_payload(Value::Array(results), &[]);
    let response = json!({
        "store_slug": store_slug,
        "query": query,
        "sort": sort.as_str(),
        "limit": limit,
        "results": normalized_results,
        "excluded_counts": excluded.to_value(),
        "truncated": false,
        "cache_hit": false,
    });
    let (capped, payload_bytes) = cap_results(response, MAX_PAYLOAD_BYTES);
    let serialize_ms = serialize_started.elapsed().as_millis();

    state.search_cache.set(&cache_key, capped.clone());

    tracing::info!(
        query,
        store_slug,
        payload_bytes,
        embed_ms,
        db_ms,
        rank_ms,
        serialize_ms,
        total_ms = total_started.elapsed().as_millis(),
        "search_products_v2 timing"
    );

    Ok(capped)
}
