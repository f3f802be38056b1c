//! Tool failure model.
//!
//! Domain failures (missing products, basket scope violations, unsupported
//! platforms) are *returned* to the caller as JSON payloads carrying a stable
//! `error` code; they never become transport errors. [`ToolError`] covers
//! the rest: argument-shape mismatches map to 400, unknown-tool to 404 in the
//! dispatcher, and infrastructure failures to 500.

use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("no indexed stores available; index a store first or provide slug explicitly")]
    NoIndexedStores,

    #[error(transparent)]
    Db(#[from] storefront_db::DbError),
}

/// A domain error payload: `{"error": <code>, "message": ...}`.
#[must_use]
pub fn error_payload(code: &str, message: impl Into<String>) -> Value {
    json!({
        "error": code,
        "message": message.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_payload_carries_code_and_message() {
        let payload = error_payload("product_not_found", "no product with handle red-tee");
        assert_eq!(payload["error"], json!("product_not_found"));
        assert_eq!(
            payload["message"],
            json!("no product with handle red-tee")
        );
    }
}
