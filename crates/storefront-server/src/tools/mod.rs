//! Tool dispatch: maps tool names to handlers, installs the request-scoped
//! store slug, and translates tool failures into transport responses.

mod basket;
mod catalog;
mod checkout;
pub mod context;
mod error;
mod search;
mod search_v2;
mod slug;
#[cfg(test)]
mod tests;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::app::AppState;
pub use error::ToolError;

/// `POST /mcp/tool/{tool}`: no path slug; tools fall back to probe-based
/// store resolution.
pub async fn invoke_tool(
    State(state): State<AppState>,
    Path(tool): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run_tool(&state, None, &tool, parse_body(&headers, &body)).await
}

/// `POST /mcp/{slug}/tool/{tool}`: the path slug is injected into the
/// arguments and installed as the request scope for the duration of the call.
pub async fn invoke_tool_scoped(
    State(state): State<AppState>,
    Path((slug, tool)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run_tool(&state, Some(slug), &tool, parse_body(&headers, &body)).await
}

/// Bodies are only parsed when the client says they are JSON; anything else
/// degrades to an empty argument object.
fn parse_body(headers: &HeaderMap, body: &Bytes) -> Option<Value> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.starts_with("application/json"));
    if !is_json {
        return None;
    }
    serde_json::from_slice(body).ok()
}

async fn run_tool(
    state: &AppState,
    scope_slug: Option<String>,
    tool: &str,
    body: Option<Value>,
) -> Response {
    // Non-JSON and non-object bodies degrade to an empty argument object.
    let payload = match body {
        Some(Value::Object(map)) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };

    let mut arguments = match payload.get("arguments") {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(_) => {
            return bad_request("Tool arguments must be a JSON object");
        }
        None => payload,
    };

    if let Some(slug) = &scope_slug {
        let object = arguments.as_object_mut().expect("arguments are an object");
        if !object.contains_key("slug") {
            object.insert("slug".to_string(), json!(slug));
        }
    }

    let outcome = match scope_slug {
        Some(slug) => {
            context::with_store_slug(Some(slug), dispatch(state, tool, arguments)).await
        }
        None => dispatch(state, tool, arguments).await,
    };

    match outcome {
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": format!("Unknown tool: {tool}") })),
        )
            .into_response(),
        Some(Ok(value)) => {
            let wrapped = if value.is_object() {
                value
            } else {
                json!({ "results": value })
            };
            (StatusCode::OK, Json(wrapped)).into_response()
        }
        Some(Err(ToolError::InvalidArguments(message))) => bad_request(&message),
        Some(Err(ToolError::NoIndexedStores)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": ToolError::NoIndexedStores.to_string() })),
        )
            .into_response(),
        Some(Err(ToolError::Db(error))) => {
            tracing::error!(error = %error, tool, "database failure during tool call");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": "database query failed" })),
            )
                .into_response()
        }
    }
}

fn bad_request(detail: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "detail": detail })),
    )
        .into_response()
}

/// Route a tool name to its handler. `None` means the tool does not exist.
async fn dispatch(
    state: &AppState,
    tool: &str,
    arguments: Value,
) -> Option<Result<Value, ToolError>> {
    Some(match tool {
        "list_stores" => catalog::list_stores(state, arguments).await,
        "search_products" => search::search_products(state, arguments).await,
        "search_products_v2" => search_v2::search_products_v2(state, arguments).await,
        "filter_products" => catalog::filter_products(state, arguments).await,
        "get_product" => catalog::get_product(state, arguments).await,
        "check_variant_availability" => {
            catalog::check_variant_availability(state, arguments).await
        }
        "list_categories" => catalog::list_categories(state, arguments).await,
        "add_to_basket" => basket::add_to_basket(state, arguments).await,
        "get_basket" => basket::get_basket(state, arguments).await,
        "update_basket_item" => basket::update_basket_item(state, arguments).await,
        "remove_basket_item" => basket::remove_basket_item(state, arguments).await,
        "clear_basket" => basket::clear_basket(state, arguments).await,
        "create_checkout_intent" => checkout::create_checkout_intent(state, arguments).await,
        "checkout_items" => checkout::checkout_items(state, arguments).await,
        _ => return None,
    })
}

/// Deserialize a tool's argument object; shape mismatches (missing, unknown,
/// or ill-typed fields) become 400s.
fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
