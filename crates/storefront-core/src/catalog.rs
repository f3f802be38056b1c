//! Catalog document model: a product row merged with its raw JSON blob,
//! plus the variant/price/option coercions shared by search and basket tools.

use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{json, Map, Value};

/// A catalog product hydrated from the `products` table. `data` is the raw
/// indexer blob; `variants` inside it are the source of truth for purchase
/// options.
#[derive(Debug, Clone)]
pub struct ProductDoc {
    pub id: String,
    pub handle: String,
    pub title: String,
    pub product_type: Option<String>,
    pub vendor: Option<String>,
    pub tags: Vec<String>,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    pub available: bool,
    pub url: String,
    pub summary_short: Option<String>,
    pub summary_llm: Option<String>,
    pub option_tokens: Vec<String>,
    pub data: Value,
}

impl ProductDoc {
    /// Variant objects from the raw data blob. Non-object entries are skipped.
    #[must_use]
    pub fn variants(&self) -> Vec<&Map<String, Value>> {
        self.data
            .get("variants")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default()
    }

    /// The full document: raw blob fields with canonical row fields layered
    /// on top, `variants` always present as an array.
    #[must_use]
    pub fn merged_value(&self) -> Value {
        let mut merged = match &self.data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };

        merged.insert("id".into(), Value::from(self.id.clone()));
        merged.insert("handle".into(), Value::from(self.handle.clone()));
        merged.insert("title".into(), Value::from(self.title.clone()));
        if let Some(product_type) = &self.product_type {
            merged.insert("product_type".into(), Value::from(product_type.clone()));
        }
        if let Some(vendor) = &self.vendor {
            merged.insert("vendor".into(), Value::from(vendor.clone()));
        }
        merged.insert("tags".into(), json!(self.tags));
        if let Some(price_min) = self.price_min {
            merged.insert("price_min".into(), Value::from(price_min));
        }
        if let Some(price_max) = self.price_max {
            merged.insert("price_max".into(), Value::from(price_max));
        }
        merged.insert("available".into(), Value::from(self.available));
        merged.insert("url".into(), Value::from(self.url.clone()));

        if !merged.contains_key("variants") {
            merged.insert("variants".into(), Value::Array(Vec::new()));
        }

        Value::Object(merged)
    }

    /// Price bounds in cents, widened by variant prices when present.
    #[must_use]
    pub fn price_range(&self) -> (Option<i64>, Option<i64>) {
        let variant_prices: Vec<i64> = self
            .variants()
            .iter()
            .filter_map(|variant| variant_price_cents(variant))
            .collect();

        let mut price_min = self.price_min;
        let mut price_max = self.price_max;
        if let (Some(lowest), Some(highest)) =
            (variant_prices.iter().min(), variant_prices.iter().max())
        {
            price_min = Some(price_min.map_or(*lowest, |current| current.min(*lowest)));
            price_max = Some(price_max.map_or(*highest, |current| current.max(*highest)));
        }
        (price_min, price_max)
    }

    /// Effective availability: any purchasable variant when variants exist,
    /// the row flag otherwise.
    #[must_use]
    pub fn availability(&self) -> bool {
        let variants = self.variants();
        if variants.is_empty() {
            self.available
        } else {
            variants.iter().any(|variant| variant_available(variant))
        }
    }

    /// Compact search-result summary. Prices are widened by variant prices;
    /// availability is derived from variants when any exist.
    #[must_use]
    pub fn summary(&self, score: Option<f64>) -> Value {
        let variants = self.variants();
        let (price_min, price_max) = self.price_range();
        let available = self.availability();

        let mut summary = json!({
            "title": self.title,
            "handle": self.handle,
            "price_min": price_min,
            "price_max": price_max,
            "available": available,
            "variant_count": variants.len(),
            "url": self.url,
            "product_url": self.url,
        });
        if let Some(score) = score {
            summary["score"] = Value::from((score * 1e6).round() / 1e6);
        }
        summary
    }
}

/// Coerce a JSON value to integer cents.
///
/// Integers are taken as cents when `assume_cents_for_int` is set, major
/// units otherwise. Floats are always major units. Dotted decimal strings
/// scale by 100 with half-up rounding; undotted ones pass through.
#[must_use]
pub fn to_cents(value: &Value, assume_cents_for_int: bool) -> Option<i64> {
    match value {
        Value::Bool(flag) => Some(i64::from(*flag)),
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                Some(if assume_cents_for_int {
                    int
                } else {
                    int.saturating_mul(100)
                })
            } else {
                n.as_f64().map(|float| (float * 100.0).round() as i64)
            }
        }
        Value::String(raw) => {
            let stripped = raw.trim().replace(',', "");
            if stripped.is_empty() {
                return None;
            }
            let parsed = stripped.parse::<Decimal>().ok()?;
            let cents = if stripped.contains('.') {
                (parsed * Decimal::from(100))
                    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            } else {
                parsed
            };
            cents.to_i64()
        }
        _ => None,
    }
}

/// Loose boolean coercion for catalog blobs (wider token set than the wire
/// normalizer: Shopify exports use `instock`/`outofstock` too).
#[must_use]
pub fn coerce_bool(value: &Value, default: bool) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(raw) => {
            let normalized = raw.trim().to_lowercase();
            match normalized.as_str() {
                "true" | "t" | "1" | "yes" | "y" | "in stock" | "available" | "instock"
                | "in_stock" => true,
                "false" | "f" | "0" | "no" | "n" | "out of stock" | "unavailable"
                | "outofstock" | "out_of_stock" => false,
                _ => default,
            }
        }
        _ => default,
    }
}

/// Lowercase both sides of an option mapping, dropping empty names/values.
#[must_use]
pub fn normalize_options(options: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    options
        .iter()
        .filter_map(|(name, value)| {
            let name = name.trim().to_lowercase();
            let value = value.trim().to_lowercase();
            (!name.is_empty() && !value.is_empty()).then_some((name, value))
        })
        .collect()
}

/// Extract a variant's option tuple. A structured `options` mapping wins;
/// positional `option1..option3` fields are coerced to `"Option N"` keys.
#[must_use]
pub fn variant_options(variant: &Map<String, Value>) -> BTreeMap<String, String> {
    if let Some(options) = variant.get("options").and_then(Value::as_object) {
        let named: BTreeMap<String, String> = options
            .iter()
            .filter_map(|(name, value)| {
                let name = name.trim().to_string();
                let value = scalar_to_string(value);
                (!name.is_empty() && !value.is_empty()).then_some((name, value))
            })
            .collect();
        if !named.is_empty() {
            return named;
        }
    }

    let mut positional = BTreeMap::new();
    for (index, key) in ["option1", "option2", "option3"].iter().enumerate() {
        let Some(raw) = variant.get(*key) else {
            continue;
        };
        let value = scalar_to_string(raw);
        if !value.is_empty() {
            positional.insert(format!("Option {}", index + 1), value);
        }
    }
    positional
}

#[must_use]
pub fn variant_available(variant: &Map<String, Value>) -> bool {
    if let Some(value) = variant.get("available") {
        return coerce_bool(value, false);
    }
    if let Some(value) = variant.get("availability") {
        return coerce_bool(value, false);
    }
    false
}

/// A variant's price in cents: `price_cents` is already cents, `price` is
/// major units.
#[must_use]
pub fn variant_price_cents(variant: &Map<String, Value>) -> Option<i64> {
    if let Some(value) = variant.get("price_cents") {
        return to_cents(value, true);
    }
    if let Some(value) = variant.get("price") {
        return to_cents(value, false);
    }
    None
}

#[must_use]
pub fn variant_id(variant: &Map<String, Value>) -> String {
    variant
        .get("id")
        .or_else(|| variant.get("variant_id"))
        .map(scalar_to_string)
        .unwrap_or_default()
}

#[must_use]
pub fn variant_title(variant: &Map<String, Value>) -> Option<String> {
    variant
        .get("title")
        .map(scalar_to_string)
        .filter(|title| !title.is_empty())
}

/// True when every requested (already-normalized) option is matched by the
/// variant's normalized options.
#[must_use]
pub fn variant_matches_options(
    variant: &Map<String, Value>,
    required: &BTreeMap<String, String>,
) -> bool {
    let variant_normalized = normalize_options(&variant_options(variant));
    required
        .iter()
        .all(|(name, value)| variant_normalized.get(name) == Some(value))
}

/// Resolve a possibly-relative catalog URL against the store base URL.
///
/// Absolute and protocol-relative URLs pass through; empty input stays empty.
#[must_use]
pub fn resolve_url(base: &str, raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    if raw.starts_with("http://") || raw.starts_with("https://") || raw.starts_with("//") {
        return raw.to_string();
    }
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return raw.to_string();
    }
    if raw.starts_with('/') {
        format!("{base}{raw}")
    } else {
        format!("{base}/{raw}")
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_variants(variants: Value) -> ProductDoc {
        ProductDoc {
            id: "1001".to_string(),
            handle: "red-tee".to_string(),
            title: "Red Tee".to_string(),
            product_type: Some("Shirts".to_string()),
            vendor: None,
            tags: vec!["cotton".to_string()],
            price_min: Some(1500),
            price_max: Some(1500),
            available: false,
            url: "https://acme.example/products/red-tee".to_string(),
            summary_short: None,
            summary_llm: None,
            option_tokens: vec![],
            data: json!({ "variants": variants }),
        }
    }

    #[test]
    fn to_cents_handles_each_input_shape() {
        assert_eq!(to_cents(&json!(1999), true), Some(1999));
        assert_eq!(to_cents(&json!(19), false), Some(1900));
        assert_eq!(to_cents(&json!(19.995), true), Some(2000));
        assert_eq!(to_cents(&json!("19.99"), false), Some(1999));
        assert_eq!(to_cents(&json!("1999"), false), Some(1999));
        assert_eq!(to_cents(&json!("1,299.50"), false), Some(129_950));
        assert_eq!(to_cents(&json!(""), false), None);
        assert_eq!(to_cents(&json!("n/a"), false), None);
    }

    #[test]
    fn variant_price_prefers_price_cents() {
        let variant = json!({"price_cents": 1999, "price": "99.00"});
        assert_eq!(
            variant_price_cents(variant.as_object().unwrap()),
            Some(1999)
        );

        let variant = json!({"price": "19.99"});
        assert_eq!(
            variant_price_cents(variant.as_object().unwrap()),
            Some(1999)
        );
    }

    #[test]
    fn positional_options_coerce_to_option_n_keys() {
        let variant = json!({"option1": "Crimson", "option3": "XL"});
        let options = variant_options(variant.as_object().unwrap());
        assert_eq!(options.get("Option 1").map(String::as_str), Some("Crimson"));
        assert_eq!(options.get("Option 3").map(String::as_str), Some("XL"));
        assert!(!options.contains_key("Option 2"));
    }

    #[test]
    fn named_options_win_over_positional() {
        let variant = json!({"options": {"Shade": "Deep"}, "option1": "ignored"});
        let options = variant_options(variant.as_object().unwrap());
        assert_eq!(options.get("Shade").map(String::as_str), Some("Deep"));
        assert_eq!(options.len(), 1);
    }

    #[test]
    fn option_superset_matching_is_case_insensitive() {
        let variant = json!({"options": {"Shade": "Deep", "Size": "Full"}});
        let variant = variant.as_object().unwrap();

        let mut required = BTreeMap::new();
        required.insert("shade".to_string(), "deep".to_string());
        assert!(variant_matches_options(variant, &required));

        required.insert("size".to_string(), "travel".to_string());
        assert!(!variant_matches_options(variant, &required));
    }

    #[test]
    fn summary_widens_prices_and_availability_from_variants() {
        let doc = doc_with_variants(json!([
            {"id": "v1", "price_cents": 900, "available": false},
            {"id": "v2", "price_cents": 2100, "available": true},
        ]));
        let summary = doc.summary(None);
        assert_eq!(summary["price_min"], json!(900));
        assert_eq!(summary["price_max"], json!(2100));
        assert_eq!(summary["available"], json!(true));
        assert_eq!(summary["variant_count"], json!(2));
    }

    #[test]
    fn summary_without_variants_uses_row_fields() {
        let doc = doc_with_variants(json!([]));
        let summary = doc.summary(Some(0.033_333_333));
        assert_eq!(summary["price_min"], json!(1500));
        assert_eq!(summary["available"], json!(false));
        assert_eq!(summary["score"], json!(0.033_333));
    }

    #[test]
    fn merged_value_always_carries_variants() {
        let doc = ProductDoc {
            data: json!({"note": "raw"}),
            ..doc_with_variants(json!([]))
        };
        let merged = doc.merged_value();
        assert_eq!(merged["note"], json!("raw"));
        assert_eq!(merged["variants"], json!([]));
        assert_eq!(merged["handle"], json!("red-tee"));
    }

    #[test]
    fn resolve_url_handles_each_shape() {
        let base = "https://acme.example/";
        assert_eq!(resolve_url(base, ""), "");
        assert_eq!(
            resolve_url(base, "https://cdn.example/x"),
            "https://cdn.example/x"
        );
        assert_eq!(
            resolve_url(base, "//cdn.example/x"),
            "//cdn.example/x"
        );
        assert_eq!(
            resolve_url(base, "/products/red-tee"),
            "https://acme.example/products/red-tee"
        );
        assert_eq!(
            resolve_url(base, "products/red-tee"),
            "https://acme.example/products/red-tee"
        );
    }
}
