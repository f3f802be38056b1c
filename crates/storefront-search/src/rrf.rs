//! Reciprocal Rank Fusion over independently-ranked candidate lists.

use std::collections::HashMap;

/// Fusion constant: `score(id) = Σ 1/(k + rank)` across input lists.
pub const RRF_K: f64 = 60.0;

/// Fuse ranked `(product_id, rank)` lists into a single scored ordering.
///
/// Ranks are 1-based. Output is sorted by fused score descending, ties broken
/// by ascending product id so results are deterministic under fixed inputs,
/// then truncated to `limit`.
#[must_use]
pub fn fuse(rankings: &[Vec<(String, i64)>], limit: usize) -> Vec<(String, f64)> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for ranking in rankings {
        for (product_id, rank) in ranking {
            *scores.entry(product_id.clone()).or_insert(0.0) += 1.0 / (RRF_K + *rank as f64);
        }
    }

    let mut ordered: Vec<(String, f64)> = scores.into_iter().collect();
    ordered.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ordered.truncate(limit);
    ordered
}
