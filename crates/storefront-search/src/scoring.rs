//! Multi-factor re-scoring for the v2 search path: budget, availability,
//! and shade-tone signals layered on top of fused retrieval relevance.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use storefront_core::catalog::{variant_options, variant_title};
use storefront_core::ProductDoc;

use crate::tone::ToneBucket;

const WEIGHT_RELEVANCE: f64 = 0.50;
const WEIGHT_BUDGET: f64 = 0.20;
const WEIGHT_AVAILABILITY: f64 = 0.15;
const WEIGHT_TONE: f64 = 0.10;
const SCORE_BASE: f64 = 0.05;

const OPTION_PREVIEW_VALUES: usize = 5;
const OPTION_PREVIEW_OPTIONS: usize = 3;

/// Ranking inputs for one v2 request.
#[derive(Debug, Clone)]
pub struct RankRequest {
    pub budget_min_cents: Option<i64>,
    pub budget_max_cents: Option<i64>,
    pub tone: Option<ToneBucket>,
    pub available_only: bool,
    pub sort: SortMode,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    BestMatch,
    PriceLowToHigh,
    PriceHighToLow,
}

impl SortMode {
    /// Normalize a caller-supplied sort string; unknown values fall back to
    /// best-match.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "price_low_to_high" => SortMode::PriceLowToHigh,
            "price_high_to_low" => SortMode::PriceHighToLow,
            _ => SortMode::BestMatch,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::BestMatch => "best_match",
            SortMode::PriceLowToHigh => "price_low_to_high",
            SortMode::PriceHighToLow => "price_high_to_low",
        }
    }
}

/// Why candidates were dropped before scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExcludedCounts {
    pub unavailable: u64,
    pub over_budget: u64,
    pub low_relevance: u64,
}

impl ExcludedCounts {
    #[must_use]
    pub fn to_value(self) -> Value {
        json!({
            "unavailable": self.unavailable,
            "over_budget": self.over_budget,
            "low_relevance": self.low_relevance,
        })
    }
}

/// A candidate that survived exclusion, with its composite score and the
/// signals that produced it.
#[derive(Debug, Clone)]
pub struct ScoredProduct {
    pub doc: ProductDoc,
    pub relevance: f64,
    pub score: f64,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    pub available: bool,
    pub tone_match: bool,
    pub matched_option_values: Vec<String>,
}

/// Score fused candidates, apply exclusions, sort, and truncate to the
/// request limit. Candidates arrive in fused order with their RRF scores.
#[must_use]
pub fn rank_candidates(
    candidates: Vec<(ProductDoc, f64)>,
    request: &RankRequest,
) -> (Vec<ScoredProduct>, ExcludedCounts) {
    let mut excluded = ExcludedCounts::default();
    let mut scored = Vec::with_capacity(candidates.len());

    for (doc, relevance) in candidates {
        let (price_min, price_max) = doc.price_range();
        let available = doc.availability();

        if request.available_only && !available {
            excluded.unavailable += 1;
            continue;
        }
        if violates_budget(price_min, price_max, request) {
            excluded.over_budget += 1;
            continue;
        }
        if relevance <= 0.0 {
            excluded.low_relevance += 1;
            continue;
        }

        let budget = budget_fit(price_min, price_max, request);
        let availability = if available { 1.0 } else { 0.0 };
        let (tone, tone_match, matched_option_values) = match request.tone {
            None => (0.5, false, Vec::new()),
            Some(bucket) => tone_fit(&doc, bucket),
        };

        let score = WEIGHT_RELEVANCE * relevance
            + WEIGHT_BUDGET * budget
            + WEIGHT_AVAILABILITY * availability
            + WEIGHT_TONE * tone
            + SCORE_BASE;

        scored.push(ScoredProduct {
            doc,
            relevance,
            score,
            price_min,
            price_max,
            available,
            tone_match,
            matched_option_values,
        });
    }

    match request.sort {
        SortMode::BestMatch => scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc.title.cmp(&b.doc.title))
        }),
        SortMode::PriceLowToHigh => scored.sort_by(|a, b| {
            a.price_min
                .unwrap_or(i64::MAX)
                .cmp(&b.price_min.unwrap_or(i64::MAX))
                .then_with(|| b.score.total_cmp(&a.score))
        }),
        SortMode::PriceHighToLow => scored.sort_by(|a, b| {
            b.price_max
                .unwrap_or(-1)
                .cmp(&a.price_max.unwrap_or(-1))
                .then_with(|| b.score.total_cmp(&a.score))
        }),
    }
    scored.truncate(request.limit);

    (scored, excluded)
}

/// Render one scored candidate as a wire result. `rank` is 1-based in the
/// final sorted order.
#[must_use]
pub fn result_value(
    product: &ScoredProduct,
    rank: usize,
    request: &RankRequest,
    store_slug: &str,
) -> Value {
    let summary = product
        .doc
        .summary_llm
        .clone()
        .or_else(|| product.doc.summary_short.clone());

    let mut value = json!({
        "rank": rank,
        "title": product.doc.title,
        "handle": product.doc.handle,
        "price_min": product.price_min,
        "price_max": product.price_max,
        "available": product.available,
        "variant_count": product.doc.variants().len(),
        "url": product.doc.url,
        "product_url": product.doc.url,
        "store_slug": store_slug,
        "score": (product.score * 1e6).round() / 1e6,
        "summary": summary,
        "why_match": why_match(product, request),
        "fit_signals": fit_signals(product, request),
        "options": options_preview(&product.doc),
    });
    if product.tone_match {
        value["tone_match"] = json!(true);
    }
    value
}

fn violates_budget(
    price_min: Option<i64>,
    price_max: Option<i64>,
    request: &RankRequest,
) -> bool {
    let floor_violation = matches!(
        (price_max, request.budget_min_cents),
        (Some(price), Some(floor)) if price < floor
    );
    let cap_violation = matches!(
        (price_min, request.budget_max_cents),
        (Some(price), Some(cap)) if price > cap
    );
    floor_violation || cap_violation
}

fn budget_fit(price_min: Option<i64>, price_max: Option<i64>, request: &RankRequest) -> f64 {
    if request.budget_min_cents.is_none() && request.budget_max_cents.is_none() {
        return 1.0;
    }
    let Some(price) = price_min.or(price_max) else {
        return 0.5;
    };
    let Some(cap) = request.budget_max_cents else {
        // Only a floor was given and this candidate already cleared it.
        return 1.0;
    };
    (1.0 - (price as f64 / cap.max(1) as f64) * 0.5).max(0.1)
}

/// Tone scoring: intersect the candidate's word tokens with the bucket's
/// synonym set. Option values that match are tracked for the
/// `recommended_option` signal and the why-match sentence.
fn tone_fit(doc: &ProductDoc, bucket: ToneBucket) -> (f64, bool, Vec<String>) {
    let synonyms: BTreeSet<&str> = bucket.synonyms().iter().copied().collect();

    let mut matched = false;
    let mut product_text = format!(
        "{} {} {} {} {}",
        doc.title,
        doc.product_type.as_deref().unwrap_or(""),
        doc.handle,
        doc.tags.join(" "),
        doc.option_tokens.join(" "),
    );
    for variant in doc.variants() {
        if let Some(title) = variant_title(variant) {
            product_text.push(' ');
            product_text.push_str(&title);
        }
    }
    for token in word_tokens(&product_text) {
        if synonyms.contains(token.as_str()) {
            matched = true;
            break;
        }
    }

    let mut matched_option_values = Vec::new();
    for variant in doc.variants() {
        for value in variant_options(variant).values() {
            let value_matches = word_tokens(value).any(|token| synonyms.contains(token.as_str()));
            if value_matches {
                matched = true;
                if !matched_option_values.contains(value) {
                    matched_option_values.push(value.clone());
                }
            }
        }
    }

    if matched {
        (1.0, true, matched_option_values)
    } else {
        (0.2, false, matched_option_values)
    }
}

fn why_match(product: &ScoredProduct, request: &RankRequest) -> String {
    let mut clauses: Vec<String> = Vec::new();
    if product.relevance > 0.0 {
        clauses.push("Matches query intent".to_string());
    }
    if request.budget_min_cents.is_some() || request.budget_max_cents.is_some() {
        clauses.push("within budget".to_string());
    }
    if product.tone_match {
        clauses.push("shade fit signal detected".to_string());
    }
    if !product.matched_option_values.is_empty() {
        clauses.push(format!(
            "tone-aligned options: {}",
            product.matched_option_values.join(", ")
        ));
    }
    clauses.join("; ")
}

fn fit_signals(product: &ScoredProduct, request: &RankRequest) -> Vec<&'static str> {
    let mut signals = Vec::new();
    if product.relevance > 0.0 {
        signals.push("intent_match");
    }
    let under_budget = request.budget_max_cents.is_some_and(|cap| {
        product
            .price_min
            .or(product.price_max)
            .is_some_and(|price| price <= cap)
    });
    if under_budget {
        signals.push("under_budget");
    }
    if product.available {
        signals.push("in_stock");
    }
    if product.tone_match {
        signals.push(match request.tone {
            Some(ToneBucket::Dark) => "deeper_shade_signal",
            _ => "skin_tone_signal",
        });
    }
    if !product.matched_option_values.is_empty() {
        signals.push("recommended_option");
    }
    signals
}

/// Per-option value preview: at most 5 values per option with a `+N more`
/// tail, at most 3 options with a `+N options` tail.
fn options_preview(doc: &ProductDoc) -> Vec<Value> {
    let mut names: Vec<String> = Vec::new();
    let mut values_by_name: Vec<Vec<String>> = Vec::new();

    for variant in doc.variants() {
        for (name, value) in variant_options(variant) {
            let index = match names.iter().position(|existing| *existing == name) {
                Some(index) => index,
                None => {
                    names.push(name);
                    values_by_name.push(Vec::new());
                    names.len() - 1
                }
            };
            if !values_by_name[index].contains(&value) {
                values_by_name[index].push(value);
            }
        }
    }

    let total_options = names.len();
    let mut preview: Vec<Value> = names
        .into_iter()
        .zip(values_by_name)
        .take(OPTION_PREVIEW_OPTIONS)
        .map(|(name, values)| {
            let total_values = values.len();
            let mut shown: Vec<String> = values.into_iter().take(OPTION_PREVIEW_VALUES).collect();
            if total_values > OPTION_PREVIEW_VALUES {
                shown.push(format!("+{} more", total_values - OPTION_PREVIEW_VALUES));
            }
            json!({ "name": name, "values": shown })
        })
        .collect();

    if total_options > OPTION_PREVIEW_OPTIONS {
        preview.push(json!({
            "name": format!("+{} options", total_options - OPTION_PREVIEW_OPTIONS),
            "values": [],
        }));
    }
    preview
}

fn word_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}
