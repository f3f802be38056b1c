//! Wire-payload normalization for tool responses.
//!
//! Every tool result passes through [`format_payload`] before leaving the
//! process. Invariants enforced here:
//! - keys containing `price` carry integer cents
//! - keys containing `available`/`availability` carry booleans
//! - `null` values are omitted
//! - array-hinted keys are never null (they become `[]`)

use std::collections::HashSet;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Value};

/// Keys that must always serialize as arrays, even when the producer left
/// them null.
const ARRAY_KEY_HINTS: [&str; 9] = [
    "products",
    "results",
    "variants",
    "tags",
    "images",
    "top_tags",
    "product_types",
    "options",
    "values",
];

/// Normalize an arbitrary JSON payload into the wire-canonical form.
///
/// `extra_array_keys` extends the built-in array-key hint set for this call.
#[must_use]
pub fn format_payload(payload: Value, extra_array_keys: &[&str]) -> Value {
    let mut array_keys: HashSet<&str> = ARRAY_KEY_HINTS.into_iter().collect();
    array_keys.extend(extra_array_keys.iter().copied());

    normalize(payload, None, &array_keys).unwrap_or(Value::Object(Map::new()))
}

/// Recursive walk. Returns `None` when the value should be omitted from its
/// parent container.
fn normalize(value: Value, key: Option<&str>, array_keys: &HashSet<&str>) -> Option<Value> {
    if value.is_null() {
        if key.is_some_and(|k| array_keys.contains(k)) {
            return Some(Value::Array(Vec::new()));
        }
        return None;
    }

    let mut value = value;
    if let Some(key) = key {
        let lowered = key.to_lowercase();
        if lowered.contains("price") {
            value = price_to_cents(value, &lowered);
        }
        if lowered.contains("available") || lowered.contains("availability") {
            value = Value::Bool(truthy(&value));
        }
    }

    match value {
        Value::Object(map) => {
            let mut output = Map::with_capacity(map.len());
            for (child_key, child_value) in map {
                match normalize(child_value, Some(child_key.as_str()), array_keys) {
                    Some(normalized) => {
                        output.insert(child_key, normalized);
                    }
                    None => {
                        if array_keys.contains(child_key.as_str()) {
                            output.insert(child_key, Value::Array(Vec::new()));
                        }
                    }
                }
            }
            Some(Value::Object(output))
        }
        Value::Array(items) => Some(Value::Array(
            items
                .into_iter()
                .filter_map(|item| normalize(item, None, array_keys))
                .collect(),
        )),
        scalar => Some(scalar),
    }
}

/// Coerce a price-keyed value to integer cents.
///
/// Keys containing `cents` are assumed to already be in cents; otherwise
/// floats and dotted decimal strings are scaled by 100 with half-up rounding.
/// Integers and undotted numeric strings pass through as-is. Unparseable
/// values are returned unchanged.
fn price_to_cents(value: Value, lowered_key: &str) -> Value {
    let key_is_cents = lowered_key.contains("cents");

    match &value {
        Value::Bool(flag) => Value::from(i64::from(*flag)),
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                Value::from(int)
            } else if let Some(float) = n.as_f64() {
                let scaled = if key_is_cents { float } else { float * 100.0 };
                Value::from(scaled.round() as i64)
            } else {
                value
            }
        }
        Value::String(raw) => {
            let stripped = raw.trim().replace(',', "");
            if stripped.is_empty() {
                return value;
            }
            let Ok(parsed) = stripped.parse::<Decimal>() else {
                return value;
            };
            let cents = if key_is_cents {
                parsed.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            } else if stripped.contains('.') {
                (parsed * Decimal::from(100))
                    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            } else {
                parsed
            };
            cents.to_i64().map_or(value, Value::from)
        }
        _ => value,
    }
}

/// Coerce an availability-keyed value to a boolean.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(raw) => {
            let normalized = raw.trim().to_lowercase();
            match normalized.as_str() {
                "true" | "t" | "1" | "yes" | "y" | "available" | "in stock" | "in_stock" => true,
                "false" | "f" | "0" | "no" | "n" | "unavailable" | "out of stock"
                | "out_of_stock" => false,
                _ => !raw.is_empty(),
            }
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
