pub mod embedder;
pub mod rrf;
pub mod scoring;
pub mod tone;
pub mod truncate;

pub use embedder::{embedding_literal, QueryEmbedder};
pub use rrf::{fuse, RRF_K};
pub use scoring::{rank_candidates, result_value, ExcludedCounts, RankRequest, ScoredProduct, SortMode};
pub use tone::ToneBucket;
pub use truncate::{cap_results, MAX_PAYLOAD_BYTES};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("query cannot be empty")]
    EmptyQuery,

    #[error("embedder is not configured (OPENAI_API_KEY unset)")]
    EmbedderDisabled,

    #[error("embedding request failed: {0}")]
    Embedding(String),
}
