//! Catalog tools: store listing, structured filtering, product detail,
//! variant availability, and category aggregates.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::{json, Map, Value};
use storefront_core::catalog::{
    normalize_options, variant_available, variant_id, variant_matches_options, variant_options,
    variant_price_cents,
};
use storefront_core::format_payload;
use storefront_db::FilterParams;

use crate::app::AppState;
use crate::tools::error::ToolError;
use crate::tools::slug::resolve_store_slug;
use crate::tools::parse_args;

fn default_store_limit() -> i64 {
    25
}

fn default_filter_limit() -> i64 {
    20
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ListStoresArgs {
    #[serde(default = "default_store_limit")]
    limit: i64,
    #[serde(default)]
    #[allow(dead_code)] // injected by the dispatcher; listing is store-agnostic
    slug: Option<String>,
}

pub async fn list_stores(state: &AppState, arguments: Value) -> Result<Value, ToolError> {
    let args: ListStoresArgs = parse_args(arguments)?;
    let limit = args.limit.clamp(1, 200);

    let rows = storefront_db::list_stores(&state.pool, limit).await?;
    let stores: Vec<Value> = rows
        .into_iter()
        .map(|store| {
            json!({
                "slug": store.slug,
                "store_name": store.store_name,
                "url": store.url,
                "platform": store.platform,
                "product_count": store.product_count,
                "indexed_at": store.indexed_at.map(|at| at.to_rfc3339()),
                "last_error": store.last_error,
            })
        })
        .collect();

    Ok(format_payload(
        json!({ "count": stores.len(), "stores": stores }),
        &["stores"],
    ))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterProductsArgs {
    #[serde(default)]
    product_type: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    min_price: Option<i64>,
    #[serde(default)]
    max_price: Option<i64>,
    #[serde(default = "default_true")]
    available_only: bool,
    #[serde(default)]
    options: Option<BTreeMap<String, Value>>,
    #[serde(default = "default_filter_limit")]
    limit: i64,
    #[serde(default)]
    slug: Option<String>,
}

pub async fn filter_products(state: &AppState, arguments: Value) -> Result<Value, ToolError> {
    let args: FilterProductsArgs = parse_args(arguments)?;

    let tags: Vec<String> = args
        .tags
        .unwrap_or_default()
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();

    // The probe hint mirrors what the caller is filtering on.
    let hint_parts: Vec<&str> = args
        .product_type
        .as_deref()
        .into_iter()
        .chain(tags.iter().map(String::as_str))
        .collect();
    let hint = hint_parts.join(" ");
    let hint = (!hint.trim().is_empty()).then_some(hint.trim());

    let store_slug = resolve_store_slug(&state.pool, args.slug.as_deref(), hint).await?;

    let limit = args.limit.clamp(1, 100);
    let params = FilterParams {
        product_type: args.product_type.as_deref().filter(|t| !t.is_empty()),
        tags,
        min_price: args.min_price,
        max_price: args.max_price,
        available_only: args.available_only,
        limit,
    };
    let docs = storefront_db::filter_products(&state.pool, &store_slug, &params).await?;

    let required_options = normalize_options(&coerce_options_arg(args.options.as_ref()));

    let mut matched = Vec::new();
    for doc in docs {
        if !required_options.is_empty() {
            let has_matching_variant = doc
                .variants()
                .iter()
                .any(|variant| variant_matches_options(variant, &required_options));
            if !has_matching_variant {
                continue;
            }
        }

        let mut summary = doc.summary(None);
        summary["store_slug"] = json!(store_slug);
        matched.push(summary);
        if matched.len() >= limit as usize {
            break;
        }
    }

    Ok(format_payload(Value::Array(matched), &["tags"]))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetProductArgs {
    handle: String,
    #[serde(default)]
    slug: Option<String>,
}

pub async fn get_product(state: &AppState, arguments: Value) -> Result<Value, ToolError> {
    let args: GetProductArgs = parse_args(arguments)?;
    let handle = args.handle.trim();
    let store_slug = resolve_store_slug(&state.pool, args.slug.as_deref(), Some(handle)).await?;

    let Some(doc) = storefront_db::find_by_handle(&state.pool, &store_slug, handle).await? else {
        return Ok(format_payload(
            json!({ "store_slug": store_slug, "handle": handle, "found": false }),
            &[],
        ));
    };

    // Option names to their values across purchasable variants only.
    let mut option_values: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for variant in doc.variants() {
        if !variant_available(variant) {
            continue;
        }
        for (name, value) in variant_options(variant) {
            option_values.entry(name).or_default().insert(value);
        }
    }
    let available_options: Map<String, Value> = option_values
        .into_iter()
        .map(|(name, values)| {
            (
                name,
                json!(values.into_iter().collect::<Vec<String>>()),
            )
        })
        .collect();

    let mut product = doc.merged_value();
    product["available_options"] = Value::Object(available_options);

    Ok(format_payload(
        json!({ "store_slug": store_slug, "found": true, "product": product }),
        &["variants"],
    ))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckVariantArgs {
    handle: String,
    options: BTreeMap<String, Value>,
    #[serde(default)]
    slug: Option<String>,
}

pub async fn check_variant_availability(
    state: &AppState,
    arguments: Value,
) -> Result<Value, ToolError> {
    let args: CheckVariantArgs = parse_args(arguments)?;
    let handle = args.handle.trim();
    let store_slug = resolve_store_slug(&state.pool, args.slug.as_deref(), Some(handle)).await?;

    let Some(doc) = storefront_db::find_by_handle(&state.pool, &store_slug, handle).await? else {
        return Ok(format_payload(
            json!({
                "store_slug": store_slug,
                "available": false,
                "variant_id": "",
                "price": 0,
                "matched": false,
                "product_url": "",
            }),
            &[],
        ));
    };

    let required = normalize_options(&coerce_options_arg(Some(&args.options)));
    for variant in doc.variants() {
        if variant_matches_options(variant, &required) {
            return Ok(format_payload(
                json!({
                    "store_slug": store_slug,
                    "product_url": doc.url,
                    "available": variant_available(variant),
                    "variant_id": variant_id(variant),
                    "price": variant_price_cents(variant).unwrap_or(0),
                    "matched": true,
                }),
                &[],
            ));
        }
    }

    Ok(format_payload(
        json!({
            "store_slug": store_slug,
            "available": false,
            "variant_id": "",
            "price": 0,
            "matched": false,
            "product_url": doc.url,
        }),
        &[],
    ))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ListCategoriesArgs {
    #[serde(default)]
    slug: Option<String>,
}

pub async fn list_categories(state: &AppState, arguments: Value) -> Result<Value, ToolError> {
    let args: ListCategoriesArgs = parse_args(arguments)?;
    let store_slug = resolve_store_slug(&state.pool, args.slug.as_deref(), None).await?;

    let product_types = storefront_db::product_type_counts(&state.pool, &store_slug).await?;
    let tags = storefront_db::top_tags(&state.pool, &store_slug, 25).await?;
    let total = storefront_db::total_products(&state.pool, &store_slug).await?;

    Ok(format_payload(
        json!({
            "store_slug": store_slug,
            "product_types": product_types
                .into_iter()
                .map(|(product_type, _)| product_type)
                .collect::<Vec<String>>(),
            "top_tags": tags
                .into_iter()
                .map(|(tag, count)| json!({ "tag": tag, "count": count }))
                .collect::<Vec<Value>>(),
            "total_products": total,
        }),
        &["product_types", "top_tags"],
    ))
}

/// Stringify a caller-supplied options object so it can be normalized like
/// variant options.
pub(crate) fn coerce_options_arg(
    options: Option<&BTreeMap<String, Value>>,
) -> BTreeMap<String, String> {
    options
        .map(|options| {
            options
                .iter()
                .filter_map(|(name, value)| {
                    let rendered = match value {
                        Value::String(s) => s.trim().to_string(),
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        _ => String::new(),
                    };
                    (!rendered.is_empty()).then(|| (name.clone(), rendered))
                })
                .collect()
        })
        .unwrap_or_default()
}
