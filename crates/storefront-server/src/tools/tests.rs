//! End-to-end tool scenarios driven through the full HTTP surface.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

use crate::app::{build_app, test_config, AppState};

fn test_state(pool: PgPool) -> AppState {
    AppState::new(pool, &test_config("postgres://unused"))
}

async fn call_tool(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
        .expect("response");

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json: Value = serde_json::from_slice(&bytes).expect("json parse");
    (status, json)
}

async fn seed_store(pool: &PgPool, slug: &str, platform: &str, product_count: i32) {
    sqlx::query(
        "INSERT INTO stores (slug, store_name, url, platform, product_count, indexed_at) \
         VALUES ($1, $2, $3, $4, $5, NOW())",
    )
    .bind(slug)
    .bind(format!("Store {slug}"))
    .bind(format!("https://{slug}.example"))
    .bind(platform)
    .bind(product_count)
    .execute(pool)
    .await
    .expect("seed store");
}

#[allow(clippy::too_many_arguments)]
async fn seed_product(
    pool: &PgPool,
    store_slug: &str,
    product_id: &str,
    handle: &str,
    title: &str,
    price_min: i64,
    available: bool,
    option_tokens: Vec<String>,
    summary_llm: Option<String>,
    data: Value,
) {
    sqlx::query(
        "INSERT INTO products \
             (store_slug, product_id, handle, title, product_type, tags, price_min, price_max, \
              available, url, option_tokens, summary_llm, is_catalog_product, data) \
         VALUES ($1, $2, $3, $4, 'Makeup', '{}', $5, $5, $6, $7, $8, $9, TRUE, $10::jsonb)",
    )
    .bind(store_slug)
    .bind(product_id)
    .bind(handle)
    .bind(title)
    .bind(price_min)
    .bind(available)
    .bind(format!("https://{store_slug}.example/products/{handle}"))
    .bind(option_tokens)
    .bind(summary_llm)
    .bind(data)
    .execute(pool)
    .await
    .expect("seed product");
}

fn single_variant(id: &str, price_cents: i64) -> Value {
    json!({ "variants": [
        { "id": id, "available": true, "price_cents": price_cents }
    ]})
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn v2_budget_excludes_expensive_products_and_reports_signals(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 2).await;
    seed_product(
        &pool,
        "acme",
        "a1",
        "matte-lipstick",
        "Matte Lipstick",
        1500,
        true,
        vec!["matte".to_string()],
        None,
        json!({}),
    )
    .await;
    seed_product(
        &pool,
        "acme",
        "b1",
        "matte-lipstick-deluxe",
        "Matte Lipstick Deluxe",
        4500,
        true,
        vec![],
        None,
        json!({}),
    )
    .await;

    let app = build_app(test_state(pool));
    let (status, body) = call_tool(
        app,
        "/mcp/tool/search_products_v2",
        json!({
            "query": "matte lipstick",
            "budget_max_cents": 2000,
            "limit": 5,
            "slug": "acme",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().expect("results array");
    assert_eq!(results.len(), 1, "only the affordable product survives");
    assert_eq!(results[0]["handle"], json!("matte-lipstick"));
    assert_eq!(results[0]["rank"], json!(1));
    assert_eq!(body["excluded_counts"]["over_budget"], json!(1));

    let signals: Vec<&str> = results[0]["fit_signals"]
        .as_array()
        .expect("fit_signals")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(signals.contains(&"under_budget"));
    assert!(signals.contains(&"in_stock"));
    assert!(signals.contains(&"intent_match"));
    assert_eq!(body["truncated"], json!(false));
    assert_eq!(body["cache_hit"], json!(false));
}

#[sqlx::test(migrations = "../../migrations")]
async fn legacy_search_honors_available_only(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 2).await;
    // C outranks D lexically but is unavailable.
    seed_product(
        &pool, "acme", "c1", "foo-triple", "foo foo foo", 1000, false, vec![], None, json!({}),
    )
    .await;
    seed_product(
        &pool, "acme", "d1", "foo-single", "foo", 1000, true, vec![], None, json!({}),
    )
    .await;

    let state = test_state(pool);

    let (status, body) = call_tool(
        build_app(state.clone()),
        "/mcp/tool/search_products",
        json!({ "query": "foo", "available_only": true, "slug": "acme" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().expect("results");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["handle"], json!("foo-single"));

    let (_, body) = call_tool(
        build_app(state),
        "/mcp/tool/search_products",
        json!({ "query": "foo", "available_only": false, "slug": "acme" }),
    )
    .await;
    let results = body["results"].as_array().expect("results");
    assert_eq!(results.len(), 2);
    assert_eq!(
        results[0]["handle"],
        json!("foo-triple"),
        "higher-ranked unavailable product leads when the filter is off"
    );
    assert_eq!(results[0]["available"], json!(false));
}

#[sqlx::test(migrations = "../../migrations")]
async fn legacy_search_results_are_cached_per_signature(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 1).await;
    seed_product(
        &pool, "acme", "a1", "serum", "Face Serum", 1000, true, vec![], None, json!({}),
    )
    .await;

    let state = test_state(pool);
    let app = build_app(state.clone());
    let (_, first) = call_tool(
        app,
        "/mcp/tool/search_products",
        json!({ "query": "serum", "slug": "acme" }),
    )
    .await;

    assert_eq!(state.search_cache.len(), 1);
    let (_, second) = call_tool(
        build_app(state),
        "/mcp/tool/search_products",
        json!({ "query": "serum", "slug": "acme" }),
    )
    .await;
    assert_eq!(first, second);
}

#[sqlx::test(migrations = "../../migrations")]
async fn v2_cache_hits_are_flagged_copies(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 1).await;
    seed_product(
        &pool, "acme", "a1", "serum", "Face Serum", 1000, true, vec![], None, json!({}),
    )
    .await;

    let state = test_state(pool);
    let request = json!({ "query": "serum", "slug": "acme" });

    let (_, first) = call_tool(
        build_app(state.clone()),
        "/mcp/tool/search_products_v2",
        request.clone(),
    )
    .await;
    assert_eq!(first["cache_hit"], json!(false));

    let (_, second) = call_tool(
        build_app(state.clone()),
        "/mcp/tool/search_products_v2",
        request.clone(),
    )
    .await;
    assert_eq!(second["cache_hit"], json!(true));
    assert_eq!(second["results"], first["results"]);

    // The cached canonical copy is untouched by readers.
    let (_, third) = call_tool(build_app(state), "/mcp/tool/search_products_v2", request).await;
    assert_eq!(third["cache_hit"], json!(true));
}

#[sqlx::test(migrations = "../../migrations")]
async fn v2_payload_cap_truncates_verbose_results(pool: PgPool) {
    seed_store(&pool, "cap-store", "shopify", 8).await;
    for i in 0..8 {
        seed_product(
            &pool,
            "cap-store",
            &format!("p{i}"),
            &format!("verbose-{i}"),
            &format!("Verbose Thing {i}"),
            1000,
            true,
            vec![],
            Some("x".repeat(2000)),
            json!({}),
        )
        .await;
    }

    let (status, body) = call_tool(
        build_app(test_state(pool)),
        "/mcp/tool/search_products_v2",
        json!({ "query": "verbose", "limit": 8, "slug": "cap-store" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["truncated"], json!(true));
    let results = body["results"].as_array().expect("results");
    assert!(results.len() < 8, "tail results are dropped");
    let serialized = body.to_string();
    assert!(
        serialized.len() <= 12 * 1024,
        "serialized payload stays within 12KiB, got {}",
        serialized.len()
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn search_auto_selects_the_store_with_most_matches(pool: PgPool) {
    seed_store(&pool, "beta", "shopify", 3).await;
    seed_store(&pool, "alpha", "shopify", 12).await;
    for i in 0..12 {
        seed_product(
            &pool,
            "alpha",
            &format!("a{i}"),
            &format!("serum-{i}"),
            "Face Serum",
            1000,
            true,
            vec![],
            None,
            json!({}),
        )
        .await;
    }
    for i in 0..3 {
        seed_product(
            &pool,
            "beta",
            &format!("b{i}"),
            &format!("serum-{i}"),
            "Face Serum",
            1000,
            true,
            vec![],
            None,
            json!({}),
        )
        .await;
    }

    // No slug argument and no path scope: the probe cascade picks alpha.
    let (status, body) = call_tool(
        build_app(test_state(pool)),
        "/mcp/tool/search_products",
        json!({ "query": "serum" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().expect("results");
    assert!(!results.is_empty());
    assert!(results
        .iter()
        .all(|result| result["store_slug"] == json!("alpha")));
}

#[sqlx::test(migrations = "../../migrations")]
async fn v2_reports_disabled_flag_as_tool_error_payload(pool: PgPool) {
    let mut config = test_config("postgres://unused");
    config.v2_enabled = false;
    let (status, body) = call_tool(
        build_app(AppState::new(pool, &config)),
        "/mcp/tool/search_products_v2",
        json!({ "query": "anything" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], json!("v2_disabled"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn empty_query_returns_empty_results(pool: PgPool) {
    let (status, body) = call_tool(
        build_app(test_state(pool)),
        "/mcp/tool/search_products",
        json!({ "query": "   " }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "results": [] }));
}

// ---------------------------------------------------------------------------
// Catalog tools
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn get_product_reports_available_options(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 1).await;
    seed_product(
        &pool,
        "acme",
        "p1",
        "tinted-balm",
        "Tinted Balm",
        1200,
        true,
        vec![],
        None,
        json!({ "variants": [
            { "id": "v1", "available": true, "options": { "Shade": "Rose" } },
            { "id": "v2", "available": true, "options": { "Shade": "Berry" } },
            { "id": "v3", "available": false, "options": { "Shade": "Fig" } },
        ]}),
    )
    .await;

    let (status, body) = call_tool(
        build_app(test_state(pool)),
        "/mcp/acme/tool/get_product",
        json!({ "handle": "tinted-balm" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["found"], json!(true));
    assert_eq!(body["store_slug"], json!("acme"));
    // Unavailable variants do not contribute option values.
    assert_eq!(
        body["product"]["available_options"]["Shade"],
        json!(["Berry", "Rose"])
    );
    assert_eq!(body["product"]["variants"].as_array().map(Vec::len), Some(3));
}

#[sqlx::test(migrations = "../../migrations")]
async fn get_product_miss_reports_found_false(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 0).await;

    let (status, body) = call_tool(
        build_app(test_state(pool)),
        "/mcp/acme/tool/get_product",
        json!({ "handle": "ghost" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["found"], json!(false));
    assert_eq!(body["handle"], json!("ghost"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn check_variant_availability_matches_exact_options(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 1).await;
    seed_product(
        &pool,
        "acme",
        "p1",
        "tinted-balm",
        "Tinted Balm",
        1200,
        true,
        vec![],
        None,
        json!({ "variants": [
            { "id": "v1", "available": true, "price": "12.00", "options": { "Shade": "Rose" } },
            { "id": "v2", "available": false, "price": "14.00", "options": { "Shade": "Fig" } },
        ]}),
    )
    .await;

    let app_state = test_state(pool);
    let (_, body) = call_tool(
        build_app(app_state.clone()),
        "/mcp/acme/tool/check_variant_availability",
        json!({ "handle": "tinted-balm", "options": { "shade": "rose" } }),
    )
    .await;
    assert_eq!(body["matched"], json!(true));
    assert_eq!(body["available"], json!(true));
    assert_eq!(body["variant_id"], json!("v1"));
    assert_eq!(body["price"], json!(1200));

    let (_, body) = call_tool(
        build_app(app_state),
        "/mcp/acme/tool/check_variant_availability",
        json!({ "handle": "tinted-balm", "options": { "shade": "sand" } }),
    )
    .await;
    assert_eq!(body["matched"], json!(false));
    assert_eq!(body["available"], json!(false));
    assert_eq!(body["variant_id"], json!(""));
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_categories_aggregates_types_and_tags(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 2).await;
    seed_product(
        &pool, "acme", "p1", "one", "One", 1000, true, vec![], None, json!({}),
    )
    .await;
    seed_product(
        &pool, "acme", "p2", "two", "Two", 1000, true, vec![], None, json!({}),
    )
    .await;

    let (status, body) = call_tool(
        build_app(test_state(pool)),
        "/mcp/acme/tool/list_categories",
        json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["product_types"], json!(["Makeup"]));
    assert_eq!(body["total_products"], json!(2));
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_stores_orders_by_product_count(pool: PgPool) {
    seed_store(&pool, "small", "shopify", 1).await;
    seed_store(&pool, "big", "woocommerce", 10).await;

    let (status, body) = call_tool(
        build_app(test_state(pool)),
        "/mcp/tool/list_stores",
        json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(2));
    let stores = body["stores"].as_array().expect("stores");
    assert_eq!(stores[0]["slug"], json!("big"));
    assert_eq!(stores[1]["slug"], json!("small"));
}

// ---------------------------------------------------------------------------
// Basket + checkout
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn add_to_basket_accumulates_and_builds_shopify_checkout(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 1).await;
    seed_product(
        &pool,
        "acme",
        "p1",
        "red-tee",
        "Red Tee",
        1999,
        true,
        vec![],
        None,
        single_variant("gid://v1", 1999),
    )
    .await;

    let state = test_state(pool);

    let (status, body) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/add_to_basket",
        json!({ "handle": "red-tee", "quantity": 2 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let basket_id = body["basket_id"].as_str().expect("basket id").to_string();
    assert!(basket_id.starts_with("basket_"));
    assert_eq!(basket_id.len(), "basket_".len() + 24);
    assert_eq!(body["basket"]["subtotal"], json!(3998));
    assert_eq!(body["basket"]["item_count"], json!(1));
    assert_eq!(body["basket"]["items"][0]["quantity"], json!(2));

    // Same basket, same variant: quantities accumulate.
    let (_, body) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/add_to_basket",
        json!({ "handle": "red-tee", "quantity": 2, "basket_id": basket_id }),
    )
    .await;
    assert_eq!(body["basket"]["items"][0]["quantity"], json!(4));
    assert_eq!(body["basket"]["quantity_total"], json!(4));
    assert_eq!(body["basket"]["subtotal"], json!(7996));

    let (_, body) = call_tool(
        build_app(state),
        "/mcp/acme/tool/create_checkout_intent",
        json!({ "basket_id": basket_id }),
    )
    .await;
    assert_eq!(body["supported"], json!(true));
    assert_eq!(
        body["checkout_url"],
        json!("https://acme.example/cart/gid%3A%2F%2Fv1:4")
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn non_shopify_checkout_falls_back_to_manual(pool: PgPool) {
    seed_store(&pool, "zeta", "woocommerce", 1).await;
    seed_product(
        &pool,
        "zeta",
        "p1",
        "mug",
        "Mug",
        1200,
        true,
        vec![],
        None,
        single_variant("m1", 1200),
    )
    .await;

    let state = test_state(pool);
    let (_, added) = call_tool(
        build_app(state.clone()),
        "/mcp/zeta/tool/add_to_basket",
        json!({ "handle": "mug" }),
    )
    .await;
    let basket_id = added["basket_id"].as_str().expect("basket id").to_string();

    let (_, body) = call_tool(
        build_app(state.clone()),
        "/mcp/zeta/tool/create_checkout_intent",
        json!({ "basket_id": basket_id }),
    )
    .await;
    assert_eq!(body["supported"], json!(false));
    assert_eq!(body["reason"], json!("unsupported_platform"));
    assert_eq!(body["manual_checkout"], json!(true));
    let urls = body["product_urls"].as_array().expect("product urls");
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0], json!("https://zeta.example/products/mug"));

    // The basket stays active after a manual fallback.
    let (_, basket) = call_tool(
        build_app(state),
        "/mcp/zeta/tool/get_basket",
        json!({ "basket_id": basket_id }),
    )
    .await;
    assert_eq!(basket["status"], json!("active"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn mark_checked_out_freezes_the_basket(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 1).await;
    seed_product(
        &pool,
        "acme",
        "p1",
        "red-tee",
        "Red Tee",
        1999,
        true,
        vec![],
        None,
        single_variant("v1", 1999),
    )
    .await;

    let state = test_state(pool);
    let (_, added) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/add_to_basket",
        json!({ "handle": "red-tee" }),
    )
    .await;
    let basket_id = added["basket_id"].as_str().expect("basket id").to_string();

    let (_, intent) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/create_checkout_intent",
        json!({ "basket_id": basket_id, "mark_checked_out": true }),
    )
    .await;
    assert_eq!(intent["checked_out"], json!(true));
    assert_eq!(intent["basket"]["status"], json!("checked_out"));

    // Mutations on a checked-out basket are rejected...
    let (_, add_again) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/add_to_basket",
        json!({ "handle": "red-tee", "basket_id": basket_id }),
    )
    .await;
    assert_eq!(add_again["error"], json!("basket_not_active"));

    // ...but the checkout link can be re-fetched.
    let (_, refetch) = call_tool(
        build_app(state),
        "/mcp/acme/tool/create_checkout_intent",
        json!({ "basket_id": basket_id }),
    )
    .await;
    assert_eq!(refetch["supported"], json!(true));
    assert!(refetch["checkout_url"]
        .as_str()
        .expect("url")
        .contains("/cart/"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn basket_scope_mismatch_is_rejected(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 1).await;
    seed_store(&pool, "zeta", "shopify", 1).await;
    seed_product(
        &pool,
        "acme",
        "p1",
        "red-tee",
        "Red Tee",
        1999,
        true,
        vec![],
        None,
        single_variant("v1", 1999),
    )
    .await;

    let state = test_state(pool);
    let (_, added) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/add_to_basket",
        json!({ "handle": "red-tee" }),
    )
    .await;
    let basket_id = added["basket_id"].as_str().expect("basket id").to_string();

    // Path scope says zeta; the basket is pinned to acme.
    let (_, body) = call_tool(
        build_app(state),
        "/mcp/zeta/tool/get_basket",
        json!({ "basket_id": basket_id }),
    )
    .await;
    assert_eq!(body["error"], json!("basket_scope_error"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn quantity_rules_clamp_and_delete(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 1).await;
    seed_product(
        &pool,
        "acme",
        "p1",
        "red-tee",
        "Red Tee",
        1999,
        true,
        vec![],
        None,
        single_variant("v1", 1999),
    )
    .await;

    let state = test_state(pool);
    let (_, added) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/add_to_basket",
        json!({ "handle": "red-tee" }),
    )
    .await;
    let basket_id = added["basket_id"].as_str().expect("basket id").to_string();

    // Over-limit quantities clamp to 99.
    let (_, body) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/update_basket_item",
        json!({ "basket_id": basket_id, "variant_id": "v1", "quantity": 500 }),
    )
    .await;
    assert_eq!(body["basket"]["items"][0]["quantity"], json!(99));

    // Zero deletes the line.
    let (_, body) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/update_basket_item",
        json!({ "basket_id": basket_id, "variant_id": "v1", "quantity": 0 }),
    )
    .await;
    assert_eq!(body["removed"], json!("v1"));
    assert_eq!(body["basket"]["item_count"], json!(0));
    assert_eq!(body["basket"]["items"], json!([]));

    // Removing again reports the missing line.
    let (_, body) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/remove_basket_item",
        json!({ "basket_id": basket_id, "variant_id": "v1" }),
    )
    .await;
    assert_eq!(body["error"], json!("basket_line_not_found"));

    // Empty baskets cannot check out.
    let (_, body) = call_tool(
        build_app(state),
        "/mcp/acme/tool/create_checkout_intent",
        json!({ "basket_id": basket_id }),
    )
    .await;
    assert_eq!(body["error"], json!("empty_basket"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn variant_resolution_ladder_covers_ambiguity(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 1).await;
    seed_product(
        &pool,
        "acme",
        "p1",
        "two-shades",
        "Two Shades",
        1000,
        true,
        vec![],
        None,
        json!({ "variants": [
            { "id": "v1", "available": true, "price_cents": 1000,
              "options": { "Shade": "Rose" } },
            { "id": "v2", "available": true, "price_cents": 1100,
              "options": { "Shade": "Fig" } },
        ]}),
    )
    .await;

    let state = test_state(pool);

    // Two purchasable variants and no selector: selection required.
    let (_, body) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/add_to_basket",
        json!({ "handle": "two-shades" }),
    )
    .await;
    assert_eq!(body["error"], json!("variant_selection_required"));

    // Options pick a variant case-insensitively.
    let (_, body) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/add_to_basket",
        json!({ "handle": "two-shades", "options": { "shade": "FIG" } }),
    )
    .await;
    assert_eq!(body["added"]["variant_id"], json!("v2"));
    assert_eq!(body["added"]["unit_price"], json!(1100));

    // Unknown options fail.
    let (_, body) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/add_to_basket",
        json!({ "handle": "two-shades", "options": { "shade": "sand" } }),
    )
    .await;
    assert_eq!(body["error"], json!("options_not_found"));

    // Explicit variant ids must match exactly.
    let (_, body) = call_tool(
        build_app(state),
        "/mcp/acme/tool/add_to_basket",
        json!({ "handle": "two-shades", "variant_id": "v9" }),
    )
    .await;
    assert_eq!(body["error"], json!("variant_not_found"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn checkout_items_composite_adds_then_builds_intent(pool: PgPool) {
    seed_store(&pool, "acme", "shopify", 2).await;
    seed_product(
        &pool,
        "acme",
        "p1",
        "red-tee",
        "Red Tee",
        1999,
        true,
        vec![],
        None,
        single_variant("v1", 1999),
    )
    .await;
    seed_product(
        &pool,
        "acme",
        "p2",
        "blue-tee",
        "Blue Tee",
        1499,
        true,
        vec![],
        None,
        single_variant("v2", 1499),
    )
    .await;

    let state = test_state(pool);
    let (status, body) = call_tool(
        build_app(state.clone()),
        "/mcp/acme/tool/checkout_items",
        json!({ "items": [
            { "handle": "red-tee", "quantity": 2 },
            { "handle": "blue-tee" },
        ]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["supported"], json!(true));
    assert_eq!(body["added_items"], json!(2));
    assert_eq!(body["line_count"], json!(2));
    assert_eq!(
        body["checkout_url"],
        json!("https://acme.example/cart/v1:2,v2:1")
    );

    // A failing line short-circuits with its index.
    let (_, body) = call_tool(
        build_app(state),
        "/mcp/acme/tool/checkout_items",
        json!({ "items": [
            { "handle": "red-tee" },
            { "handle": "no-such-tee" },
        ]}),
    )
    .await;
    assert_eq!(body["error"], json!("product_not_found"));
    assert_eq!(body["line_index"], json!(1));
    assert_eq!(body["added_count"], json!(1));
}
