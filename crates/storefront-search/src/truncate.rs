//! Output-size cap for search responses.

use serde_json::Value;

/// Serialized UTF-8 budget for one search response.
pub const MAX_PAYLOAD_BYTES: usize = 12 * 1024;

/// Pop results from the end of `response["results"]` until the serialized
/// payload fits in `max_bytes`, flipping `truncated` when anything is
/// dropped. Worst case leaves an empty results list with `truncated: true`.
///
/// Returns the capped response and its final serialized size.
#[must_use]
pub fn cap_results(mut response: Value, max_bytes: usize) -> (Value, usize) {
    loop {
        let size = serde_json::to_string(&response)
            .map(|serialized| serialized.len())
            .unwrap_or(usize::MAX);
        if size <= max_bytes {
            return (response, size);
        }

        let Some(results) = response
            .get_mut("results")
            .and_then(Value::as_array_mut)
        else {
            return (response, size);
        };
        if results.pop().is_none() {
            // Nothing left to drop; the envelope itself is oversized.
            return (response, size);
        }
        response["truncated"] = Value::Bool(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response_with_results(count: usize, summary_len: usize) -> Value {
        let results: Vec<Value> = (0..count)
            .map(|i| json!({"rank": i + 1, "summary": "x".repeat(summary_len)}))
            .collect();
        json!({"results": results, "truncated": false})
    }

    #[test]
    fn small_payloads_pass_through_untouched() {
        let response = response_with_results(3, 10);
        let before = serde_json::to_string(&response).unwrap();
        let (capped, size) = cap_results(response, MAX_PAYLOAD_BYTES);

        assert_eq!(capped["truncated"], json!(false));
        assert_eq!(capped["results"].as_array().unwrap().len(), 3);
        // Untruncated responses re-serialize identically.
        assert_eq!(serde_json::to_string(&capped).unwrap(), before);
        assert_eq!(size, before.len());
    }

    #[test]
    fn oversized_payloads_drop_tail_results_until_they_fit() {
        // 8 results x ~2KiB comfortably exceeds 12KiB.
        let response = response_with_results(8, 2000);
        let (capped, size) = cap_results(response, MAX_PAYLOAD_BYTES);

        assert_eq!(capped["truncated"], json!(true));
        assert!(size <= MAX_PAYLOAD_BYTES);
        let kept = capped["results"].as_array().unwrap();
        assert!(kept.len() < 8 && !kept.is_empty());
        // Survivors keep their original ranks from the front of the list.
        assert_eq!(kept[0]["rank"], json!(1));
    }

    #[test]
    fn worst_case_empties_results_entirely() {
        let response = response_with_results(1, 64);
        let (capped, _) = cap_results(response, 16);

        assert_eq!(capped["truncated"], json!(true));
        assert!(capped["results"].as_array().unwrap().is_empty());
    }
}
