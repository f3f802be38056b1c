//! Basket tools: durable baskets with line-level upserts, quantity rules,
//! and store-scope validation.

use std::collections::BTreeMap;

use rand::RngCore;
use serde::Deserialize;
use serde_json::{json, Value};
use storefront_core::catalog::{
    normalize_options, resolve_url, variant_available, variant_id, variant_matches_options,
    variant_options, variant_price_cents,
};
use storefront_core::format_payload;
use storefront_db::{BasketRow, NewBasketItem};

use crate::app::AppState;
use crate::tools::catalog::coerce_options_arg;
use crate::tools::context;
use crate::tools::error::{error_payload, ToolError};
use crate::tools::parse_args;
use crate::tools::slug::resolve_store_slug;

const MAX_LINE_QUANTITY: i64 = 99;

/// Domain outcome: `Err` carries a returned error payload, never a transport
/// failure.
type Outcome = Result<Value, Value>;

fn flatten(outcome: Outcome) -> Value {
    outcome.unwrap_or_else(|error| error)
}

fn generate_basket_id() -> String {
    let mut bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("basket_{hex}")
}

/// The store the caller explicitly asked for, if any: the `slug` argument or
/// the request scope. Probe-based fallbacks are not used to challenge a
/// basket's pinned store on reads.
fn requested_scope(slug_arg: Option<&str>) -> Option<String> {
    if let Some(explicit) = slug_arg.map(str::trim).filter(|s| !s.is_empty()) {
        return Some(explicit.to_string());
    }
    context::current_store_slug()
        .map(|scoped| scoped.trim().to_string())
        .filter(|scoped| !scoped.is_empty())
}

/// Fetch a basket for an operation, enforcing id shape, existence, caller
/// scope, and (optionally) the `active` status.
pub(crate) async fn fetch_scoped_basket(
    state: &AppState,
    basket_id: &str,
    slug_arg: Option<&str>,
    require_active: bool,
) -> Result<Result<BasketRow, Value>, ToolError> {
    let basket_id = basket_id.trim();
    if basket_id.is_empty() {
        return Ok(Err(error_payload(
            "invalid_basket_id",
            "basket_id must be a non-empty string",
        )));
    }

    let Some(basket) = storefront_db::get_basket(&state.pool, basket_id).await? else {
        return Ok(Err(error_payload(
            "basket_not_found",
            format!("no basket with id {basket_id}"),
        )));
    };

    if let Some(scope) = requested_scope(slug_arg) {
        if scope != basket.store_slug {
            return Ok(Err(error_payload(
                "basket_scope_error",
                format!(
                    "basket {basket_id} belongs to store {}, not {scope}",
                    basket.store_slug
                ),
            )));
        }
    }

    if require_active && !basket.is_active() {
        return Ok(Err(error_payload(
            "basket_not_active",
            format!("basket {basket_id} is already checked out"),
        )));
    }

    Ok(Ok(basket))
}

/// Fetch an existing active basket for the resolved store, or create a new
/// one with a fresh opaque id.
async fn ensure_basket(
    state: &AppState,
    basket_id: Option<&str>,
    store_slug: &str,
) -> Result<Result<BasketRow, Value>, ToolError> {
    if let Some(existing) = basket_id.map(str::trim).filter(|id| !id.is_empty()) {
        let Some(basket) = storefront_db::get_basket(&state.pool, existing).await? else {
            return Ok(Err(error_payload(
                "basket_not_found",
                format!("no basket with id {existing}"),
            )));
        };
        if basket.store_slug != store_slug {
            return Ok(Err(error_payload(
                "basket_scope_error",
                format!(
                    "basket {existing} belongs to store {}, not {store_slug}",
                    basket.store_slug
                ),
            )));
        }
        if !basket.is_active() {
            return Ok(Err(error_payload(
                "basket_not_active",
                format!("basket {existing} is already checked out"),
            )));
        }
        return Ok(Ok(basket));
    }

    match storefront_db::create_basket(&state.pool, &generate_basket_id(), store_slug).await {
        Ok(basket) => Ok(Ok(basket)),
        Err(error) => {
            tracing::error!(error = %error, store_slug, "basket insert failed");
            Ok(Err(error_payload(
                "basket_create_failed",
                "could not create a basket",
            )))
        }
    }
}

/// The wire shape of one basket: header, ordered lines, and derived totals.
pub(crate) async fn basket_value(
    state: &AppState,
    basket: &BasketRow,
) -> Result<Value, ToolError> {
    let items = storefront_db::list_items(&state.pool, &basket.basket_id).await?;

    let item_count = items.len();
    let quantity_total: i64 = items.iter().map(|item| i64::from(item.quantity)).sum();
    let subtotal: i64 = items
        .iter()
        .map(|item| item.unit_price * i64::from(item.quantity))
        .sum();

    let lines: Vec<Value> = items
        .into_iter()
        .map(|item| {
            json!({
                "variant_id": item.variant_id,
                "handle": item.handle,
                "title": item.title,
                "product_url": item.product_url,
                "options": item.options,
                "unit_price": item.unit_price,
                "quantity": item.quantity,
                "line_total": item.unit_price * i64::from(item.quantity),
                "available": item.available,
                "added_at": item.added_at.to_rfc3339(),
                "updated_at": item.updated_at.to_rfc3339(),
            })
        })
        .collect();

    Ok(json!({
        "basket_id": basket.basket_id,
        "store_slug": basket.store_slug,
        "status": basket.status,
        "checkout_url": basket.checkout_url.clone().unwrap_or_default(),
        "checked_out_at": basket.checked_out_at.map(|at| at.to_rfc3339()),
        "created_at": basket.created_at.to_rfc3339(),
        "updated_at": basket.updated_at.to_rfc3339(),
        "item_count": item_count,
        "quantity_total": quantity_total,
        "subtotal": subtotal,
        "items": lines,
    }))
}

/// One line to add: the shared core of `add_to_basket` and `checkout_items`.
pub(crate) struct AddLine {
    pub handle: String,
    pub quantity: i64,
    pub variant_id: Option<String>,
    pub options: Option<BTreeMap<String, Value>>,
}

pub(crate) async fn add_line(
    state: &AppState,
    line: &AddLine,
    basket_id: Option<&str>,
    slug_arg: Option<&str>,
) -> Result<Outcome, ToolError> {
    let handle = line.handle.trim();
    if handle.is_empty() {
        return Ok(Err(error_payload(
            "invalid_handle",
            "handle must be a non-empty string",
        )));
    }
    if line.quantity <= 0 {
        return Ok(Err(error_payload(
            "invalid_quantity",
            "quantity must be at least 1",
        )));
    }
    let quantity = line.quantity.min(MAX_LINE_QUANTITY) as i32;

    let requested_variant = line.variant_id.as_deref().map(str::trim);
    if requested_variant == Some("") {
        return Ok(Err(error_payload(
            "invalid_variant_id",
            "variant_id must be a non-empty string",
        )));
    }

    let store_slug = resolve_store_slug(&state.pool, slug_arg, Some(handle)).await?;

    let basket = match ensure_basket(state, basket_id, &store_slug).await? {
        Ok(basket) => basket,
        Err(error) => return Ok(Err(error)),
    };

    let Some(product) = storefront_db::find_by_handle(&state.pool, &store_slug, handle).await?
    else {
        return Ok(Err(error_payload(
            "product_not_found",
            format!("no product with handle {handle} in store {store_slug}"),
        )));
    };

    let variants = product.variants();
    if variants.is_empty() {
        return Ok(Err(error_payload(
            "no_variants",
            format!("product {handle} has no purchasable variants"),
        )));
    }

    let required_options = normalize_options(&coerce_options_arg(line.options.as_ref()));
    let chosen = if let Some(requested) = requested_variant {
        match variants
            .iter()
            .find(|variant| variant_id(variant) == requested)
        {
            Some(variant) => *variant,
            None => {
                return Ok(Err(error_payload(
                    "variant_not_found",
                    format!("no variant {requested} on product {handle}"),
                )));
            }
        }
    } else if !required_options.is_empty() {
        match variants
            .iter()
            .find(|variant| variant_matches_options(variant, &required_options))
        {
            Some(variant) => *variant,
            None => {
                return Ok(Err(error_payload(
                    "options_not_found",
                    format!("no variant of {handle} matches the requested options"),
                )));
            }
        }
    } else {
        let purchasable: Vec<_> = variants
            .iter()
            .filter(|variant| variant_available(variant))
            .collect();
        if purchasable.len() == 1 {
            *purchasable[0]
        } else if variants.len() == 1 {
            variants[0]
        } else {
            return Ok(Err(error_payload(
                "variant_selection_required",
                format!(
                    "product {handle} has {} variants; pass variant_id or options",
                    variants.len()
                ),
            )));
        }
    };

    if !variant_available(chosen) {
        return Ok(Err(error_payload(
            "variant_unavailable",
            format!("the selected variant of {handle} is out of stock"),
        )));
    }
    let chosen_variant_id = variant_id(chosen);
    if chosen_variant_id.is_empty() {
        return Ok(Err(error_payload(
            "missing_variant_id",
            format!("the selected variant of {handle} carries no id"),
        )));
    }

    let unit_price = variant_price_cents(chosen).or(product.price_min).unwrap_or(0);
    let store_base = storefront_db::get_store(&state.pool, &store_slug)
        .await?
        .map(|store| store.url)
        .unwrap_or_default();
    let product_url = resolve_url(&store_base, &product.url);
    let snapshot_options = normalize_options(&variant_options(chosen));

    let row = storefront_db::upsert_item(
        &state.pool,
        &NewBasketItem {
            basket_id: basket.basket_id.clone(),
            variant_id: chosen_variant_id.clone(),
            handle: handle.to_string(),
            title: product.title.clone(),
            product_url,
            options: json!(&snapshot_options),
            unit_price,
            quantity,
            available: true,
        },
    )
    .await?;

    // The basket was just touched; it vanishing here means the store is in an
    // inconsistent state, which is a hard failure.
    let refreshed = storefront_db::get_basket(&state.pool, &basket.basket_id)
        .await?
        .ok_or(storefront_db::DbError::NotFound)?;

    let response = json!({
        "basket_id": refreshed.basket_id,
        "store_slug": store_slug,
        "added": {
            "variant_id": chosen_variant_id,
            "handle": handle,
            "title": product.title,
            "quantity": row.quantity,
            "unit_price": unit_price,
            "options": snapshot_options,
        },
        "basket": basket_value(state, &refreshed).await?,
    });
    Ok(Ok(format_payload(response, &["items"])))
}

fn default_quantity() -> i64 {
    1
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AddToBasketArgs {
    handle: String,
    #[serde(default = "default_quantity")]
    quantity: i64,
    #[serde(default)]
    variant_id: Option<String>,
    #[serde(default)]
    options: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    basket_id: Option<String>,
    #[serde(default)]
    slug: Option<String>,
}

pub async fn add_to_basket(state: &AppState, arguments: Value) -> Result<Value, ToolError> {
    let args: AddToBasketArgs = parse_args(arguments)?;
    let line = AddLine {
        handle: args.handle,
        quantity: args.quantity,
        variant_id: args.variant_id,
        options: args.options,
    };
    let outcome = add_line(state, &line, args.basket_id.as_deref(), args.slug.as_deref()).await?;
    Ok(flatten(outcome))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetBasketArgs {
    basket_id: String,
    #[serde(default)]
    slug: Option<String>,
}

pub async fn get_basket(state: &AppState, arguments: Value) -> Result<Value, ToolError> {
    let args: GetBasketArgs = parse_args(arguments)?;
    let basket =
        match fetch_scoped_basket(state, &args.basket_id, args.slug.as_deref(), false).await? {
            Ok(basket) => basket,
            Err(error) => return Ok(error),
        };
    Ok(format_payload(basket_value(state, &basket).await?, &["items"]))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateBasketItemArgs {
    basket_id: String,
    variant_id: String,
    quantity: i64,
    #[serde(default)]
    slug: Option<String>,
}

pub async fn update_basket_item(state: &AppState, arguments: Value) -> Result<Value, ToolError> {
    let args: UpdateBasketItemArgs = parse_args(arguments)?;
    let outcome = set_line_quantity(
        state,
        &args.basket_id,
        &args.variant_id,
        args.quantity,
        args.slug.as_deref(),
    )
    .await?;
    Ok(flatten(outcome))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoveBasketItemArgs {
    basket_id: String,
    variant_id: String,
    #[serde(default)]
    slug: Option<String>,
}

pub async fn remove_basket_item(state: &AppState, arguments: Value) -> Result<Value, ToolError> {
    let args: RemoveBasketItemArgs = parse_args(arguments)?;
    let outcome = set_line_quantity(
        state,
        &args.basket_id,
        &args.variant_id,
        0,
        args.slug.as_deref(),
    )
    .await?;
    Ok(flatten(outcome))
}

/// Shared quantity-update path: non-positive quantities delete the line,
/// anything else clamps into [1, 99].
async fn set_line_quantity(
    state: &AppState,
    basket_id: &str,
    variant_id: &str,
    quantity: i64,
    slug_arg: Option<&str>,
) -> Result<Outcome, ToolError> {
    let variant_id = variant_id.trim();
    if variant_id.is_empty() {
        return Ok(Err(error_payload(
            "invalid_variant_id",
            "variant_id must be a non-empty string",
        )));
    }

    let basket = match fetch_scoped_basket(state, basket_id, slug_arg, true).await? {
        Ok(basket) => basket,
        Err(error) => return Ok(Err(error)),
    };

    if quantity <= 0 {
        let removed =
            storefront_db::delete_item(&state.pool, &basket.basket_id, variant_id).await?;
        if !removed {
            return Ok(Err(error_payload(
                "basket_line_not_found",
                format!("no line for variant {variant_id} in basket {}", basket.basket_id),
            )));
        }
    } else {
        let clamped = quantity.min(MAX_LINE_QUANTITY) as i32;
        let updated =
            storefront_db::set_item_quantity(&state.pool, &basket.basket_id, variant_id, clamped)
                .await?;
        if !updated {
            return Ok(Err(error_payload(
                "basket_line_not_found",
                format!("no line for variant {variant_id} in basket {}", basket.basket_id),
            )));
        }
    }

    let refreshed = storefront_db::get_basket(&state.pool, &basket.basket_id)
        .await?
        .ok_or(storefront_db::DbError::NotFound)?;
    let mut response = json!({
        "basket_id": refreshed.basket_id,
        "store_slug": refreshed.store_slug,
        "basket": basket_value(state, &refreshed).await?,
    });
    if quantity <= 0 {
        response["removed"] = json!(variant_id);
    }
    Ok(Ok(format_payload(response, &["items"])))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ClearBasketArgs {
    basket_id: String,
    #[serde(default)]
    slug: Option<String>,
}

pub async fn clear_basket(state: &AppState, arguments: Value) -> Result<Value, ToolError> {
    let args: ClearBasketArgs = parse_args(arguments)?;
    let basket =
        match fetch_scoped_basket(state, &args.basket_id, args.slug.as_deref(), true).await? {
            Ok(basket) => basket,
            Err(error) => return Ok(error),
        };

    let cleared = storefront_db::clear_items(&state.pool, &basket.basket_id).await?;

    let refreshed = storefront_db::get_basket(&state.pool, &basket.basket_id)
        .await?
        .ok_or(storefront_db::DbError::NotFound)?;
    Ok(format_payload(
        json!({
            "basket_id": refreshed.basket_id,
            "store_slug": refreshed.store_slug,
            "cleared": cleared,
            "basket": basket_value(state, &refreshed).await?,
        }),
        &["items"],
    ))
}
