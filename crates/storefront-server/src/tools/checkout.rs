//! Checkout intent: Shopify prefilled-cart permalinks with manual fallbacks
//! for everything else, plus the add-then-checkout composite.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::{json, Value};
use storefront_core::format_payload;
use storefront_db::{BasketItemRow, BasketRow};

use crate::app::AppState;
use crate::tools::basket::{add_line, basket_value, fetch_scoped_basket, AddLine};
use crate::tools::error::{error_payload, ToolError};
use crate::tools::parse_args;

/// Percent-encode a variant id for a cart permalink segment: every
/// non-alphanumeric byte is escaped, so segments always decode back to the
/// original `variant_id:quantity`.
fn encode_variant_id(variant_id: &str) -> String {
    utf8_percent_encode(variant_id, NON_ALPHANUMERIC).to_string()
}

/// `{store_url}/cart/{id}:{qty}[,{id}:{qty}]*`
fn build_permalink(store_url: &str, items: &[BasketItemRow]) -> String {
    let base = store_url.trim_end_matches('/');
    let segments: Vec<String> = items
        .iter()
        .map(|item| format!("{}:{}", encode_variant_id(&item.variant_id), item.quantity))
        .collect();
    format!("{base}/cart/{}", segments.join(","))
}

fn manual_fallback(basket: &BasketRow, reason: &str, items: &[BasketItemRow]) -> Value {
    let mut product_urls: Vec<String> = Vec::new();
    for item in items {
        let url = item.product_url.trim();
        if !url.is_empty() && !product_urls.iter().any(|existing| existing == url) {
            product_urls.push(url.to_string());
        }
    }

    format_payload(
        json!({
            "basket_id": basket.basket_id,
            "store_slug": basket.store_slug,
            "supported": false,
            "reason": reason,
            "manual_checkout": true,
            "product_urls": product_urls,
        }),
        &["product_urls"],
    )
}

/// Build (and persist) the checkout link for a basket. Allowed on
/// checked-out baskets so the link can be re-fetched.
pub(crate) async fn intent(
    state: &AppState,
    basket: &BasketRow,
    mark_checked_out: bool,
) -> Result<Result<Value, Value>, ToolError> {
    let items = storefront_db::list_items(&state.pool, &basket.basket_id).await?;
    if items.is_empty() {
        return Ok(Err(error_payload(
            "empty_basket",
            format!("basket {} has no lines to check out", basket.basket_id),
        )));
    }

    let Some(store) = storefront_db::get_store(&state.pool, &basket.store_slug).await? else {
        return Ok(Err(error_payload(
            "checkout_url_build_failed",
            format!("store record missing for {}", basket.store_slug),
        )));
    };

    if !store.platform.eq_ignore_ascii_case("shopify") {
        return Ok(Ok(manual_fallback(basket, "unsupported_platform", &items)));
    }
    if items.iter().any(|item| item.variant_id.trim().is_empty()) {
        return Ok(Ok(manual_fallback(basket, "missing_variant_ids", &items)));
    }
    if store.url.trim().is_empty() {
        return Ok(Err(error_payload(
            "checkout_url_build_failed",
            format!("store {} has no base URL", basket.store_slug),
        )));
    }

    let checkout_url = build_permalink(&store.url, &items);
    storefront_db::set_checkout_url(&state.pool, &basket.basket_id, &checkout_url).await?;
    if mark_checked_out && basket.is_active() {
        storefront_db::mark_checked_out(&state.pool, &basket.basket_id).await?;
    }

    let refreshed = storefront_db::get_basket(&state.pool, &basket.basket_id)
        .await?
        .ok_or(storefront_db::DbError::NotFound)?;

    Ok(Ok(format_payload(
        json!({
            "basket_id": refreshed.basket_id,
            "store_slug": refreshed.store_slug,
            "supported": true,
            "checkout_url": checkout_url,
            "checked_out": refreshed.status == "checked_out",
            "basket": basket_value(state, &refreshed).await?,
        }),
        &["items"],
    )))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckoutIntentArgs {
    basket_id: String,
    #[serde(default)]
    mark_checked_out: bool,
    #[serde(default)]
    slug: Option<String>,
}

pub async fn create_checkout_intent(
    state: &AppState,
    arguments: Value,
) -> Result<Value, ToolError> {
    let args: CheckoutIntentArgs = parse_args(arguments)?;
    let basket =
        match fetch_scoped_basket(state, &args.basket_id, args.slug.as_deref(), false).await? {
            Ok(basket) => basket,
            Err(error) => return Ok(error),
        };

    match intent(state, &basket, args.mark_checked_out).await? {
        Ok(value) | Err(value) => Ok(value),
    }
}

fn default_quantity() -> i64 {
    1
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckoutLine {
    handle: String,
    #[serde(default = "default_quantity")]
    quantity: i64,
    #[serde(default)]
    variant_id: Option<String>,
    #[serde(default)]
    options: Option<std::collections::BTreeMap<String, Value>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckoutItemsArgs {
    items: Vec<Value>,
    #[serde(default)]
    basket_id: Option<String>,
    #[serde(default)]
    mark_checked_out: bool,
    #[serde(default)]
    slug: Option<String>,
}

/// Add every requested line (accumulating into one basket), then build the
/// checkout intent. The first add failure short-circuits, annotated with the
/// failing line index and how many lines had landed.
pub async fn checkout_items(state: &AppState, arguments: Value) -> Result<Value, ToolError> {
    let args: CheckoutItemsArgs = parse_args(arguments)?;
    if args.items.is_empty() {
        return Ok(error_payload("invalid_items", "items must be a non-empty list"));
    }

    let mut basket_id = args
        .basket_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from);
    let mut added_count = 0u64;
    let mut line_count = 0i64;

    for (line_index, raw) in args.items.iter().enumerate() {
        let line: CheckoutLine = match serde_json::from_value(raw.clone()) {
            Ok(line) => line,
            Err(parse_error) => {
                let mut error = error_payload("invalid_items", parse_error.to_string());
                error["line_index"] = json!(line_index);
                error["added_count"] = json!(added_count);
                return Ok(error);
            }
        };

        let add = AddLine {
            handle: line.handle,
            quantity: line.quantity,
            variant_id: line.variant_id,
            options: line.options,
        };
        match add_line(state, &add, basket_id.as_deref(), args.slug.as_deref()).await? {
            Err(mut error) => {
                error["line_index"] = json!(line_index);
                error["added_count"] = json!(added_count);
                return Ok(error);
            }
            Ok(success) => {
                basket_id = success["basket_id"].as_str().map(String::from);
                line_count = success["basket"]["item_count"].as_i64().unwrap_or(0);
                added_count += 1;
            }
        }
    }

    // At least one line was added, so a basket id exists; it disappearing now
    // is a hard failure.
    let basket_id = basket_id.ok_or(storefront_db::DbError::NotFound)?;
    let basket = storefront_db::get_basket(&state.pool, &basket_id)
        .await?
        .ok_or(storefront_db::DbError::NotFound)?;

    let mut result = match intent(state, &basket, args.mark_checked_out).await? {
        Ok(value) | Err(value) => value,
    };
    result["added_items"] = json!(added_count);
    result["line_count"] = json!(line_count);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(variant_id: &str, quantity: i32) -> BasketItemRow {
        BasketItemRow {
            basket_id: "basket_x".to_string(),
            variant_id: variant_id.to_string(),
            handle: "red-tee".to_string(),
            title: "Red Tee".to_string(),
            product_url: "https://acme.example/products/red-tee".to_string(),
            options: json!({}),
            unit_price: 1999,
            quantity,
            available: true,
            added_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn variant_ids_are_fully_percent_encoded() {
        assert_eq!(encode_variant_id("gid://v1"), "gid%3A%2F%2Fv1");
        assert_eq!(encode_variant_id("12345"), "12345");
        assert_eq!(encode_variant_id("a b+c"), "a%20b%2Bc");
    }

    #[test]
    fn permalink_joins_segments_with_commas() {
        let url = build_permalink(
            "https://acme.example/",
            &[item("gid://v1", 4), item("987", 1)],
        );
        assert_eq!(url, "https://acme.example/cart/gid%3A%2F%2Fv1:4,987:1");
    }

    #[test]
    fn permalink_segments_round_trip() {
        let variant_ids = ["gid://shopify/ProductVariant/42", "plain", "a:b,c"];
        let items: Vec<BasketItemRow> = variant_ids
            .iter()
            .enumerate()
            .map(|(index, id)| item(id, index as i32 + 1))
            .collect();
        let url = build_permalink("https://acme.example", &items);

        let segments = url.rsplit_once("/cart/").expect("cart path").1;
        for (index, segment) in segments.split(',').enumerate() {
            let (encoded_id, quantity) = segment.rsplit_once(':').expect("id:qty");
            let decoded = percent_encoding::percent_decode_str(encoded_id)
                .decode_utf8()
                .expect("utf8");
            assert_eq!(decoded, variant_ids[index]);
            assert_eq!(quantity, (index + 1).to_string());
        }
    }
}
