//! Shade/tone buckets used for skin-tone aware ranking.

/// One of the three tone buckets, each backed by a fixed synonym set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneBucket {
    Dark,
    Medium,
    Light,
}

impl ToneBucket {
    /// Product-token synonyms that count as a shade match for this bucket.
    #[must_use]
    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            ToneBucket::Dark => &[
                "deep",
                "rich",
                "dark",
                "berry",
                "plum",
                "cocoa",
                "espresso",
                "mahogany",
                "fig",
                "ember",
                "vesper",
                "brown",
            ],
            ToneBucket::Medium => &[
                "tan", "medium", "rose", "mauve", "caramel", "spice", "warm", "neutral",
            ],
            ToneBucket::Light => &["light", "fair", "pink", "peach", "nude", "cool", "soft"],
        }
    }

    /// Map an explicit `skin_tone` argument to a bucket.
    #[must_use]
    pub fn from_request(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }
        if ["deep", "dark", "darker"].iter().any(|t| lowered.contains(t)) {
            Some(ToneBucket::Dark)
        } else if ["tan", "medium"].iter().any(|t| lowered.contains(t)) {
            Some(ToneBucket::Medium)
        } else if ["light", "fair"].iter().any(|t| lowered.contains(t)) {
            Some(ToneBucket::Light)
        } else {
            None
        }
    }

    /// Infer a bucket from free-text query words; first bucket to match wins.
    #[must_use]
    pub fn infer_from_query(query: &str) -> Option<Self> {
        let lowered = query.to_lowercase();
        if ["deep", "dark", "darker", "deeper", "rich"]
            .iter()
            .any(|t| lowered.contains(t))
        {
            Some(ToneBucket::Dark)
        } else if ["tan", "medium", "olive"].iter().any(|t| lowered.contains(t)) {
            Some(ToneBucket::Medium)
        } else if ["light", "fair", "pale"].iter().any(|t| lowered.contains(t)) {
            Some(ToneBucket::Light)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ToneBucket::Dark => "dark",
            ToneBucket::Medium => "medium",
            ToneBucket::Light => "light",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_tones_map_to_buckets() {
        assert_eq!(ToneBucket::from_request("deep"), Some(ToneBucket::Dark));
        assert_eq!(ToneBucket::from_request("Darker"), Some(ToneBucket::Dark));
        assert_eq!(ToneBucket::from_request("tan"), Some(ToneBucket::Medium));
        assert_eq!(ToneBucket::from_request("medium"), Some(ToneBucket::Medium));
        assert_eq!(ToneBucket::from_request("fair"), Some(ToneBucket::Light));
        assert_eq!(ToneBucket::from_request(""), None);
        assert_eq!(ToneBucket::from_request("unknown"), None);
    }

    #[test]
    fn query_inference_checks_dark_before_medium_before_light() {
        assert_eq!(
            ToneBucket::infer_from_query("rich espresso lipstick"),
            Some(ToneBucket::Dark)
        );
        assert_eq!(
            ToneBucket::infer_from_query("olive undertone foundation"),
            Some(ToneBucket::Medium)
        );
        assert_eq!(
            ToneBucket::infer_from_query("pale concealer"),
            Some(ToneBucket::Light)
        );
        // "dark" wins even when a lighter keyword also appears.
        assert_eq!(
            ToneBucket::infer_from_query("light to dark ombre"),
            Some(ToneBucket::Dark)
        );
        assert_eq!(ToneBucket::infer_from_query("plain gloss"), None);
    }

    #[test]
    fn synonym_sets_carry_their_signature_shades() {
        assert!(ToneBucket::Dark.synonyms().contains(&"espresso"));
        assert!(ToneBucket::Medium.synonyms().contains(&"caramel"));
        assert!(ToneBucket::Light.synonyms().contains(&"nude"));
    }
}
