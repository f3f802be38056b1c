//! OpenAI embeddings client for query vectors.

use serde::{Deserialize, Serialize};

use crate::SearchError;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Query embedder backed by the OpenAI embeddings API.
///
/// Disabled (and inert) when no API key is configured; callers check
/// [`QueryEmbedder::enabled`] and degrade to lexical-only retrieval.
pub struct QueryEmbedder {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

impl QueryEmbedder {
    #[must_use]
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(api_key, model, OPENAI_BASE_URL)
    }

    /// Override the API base URL (mock servers in tests).
    #[must_use]
    pub fn with_base_url(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.filter(|key| !key.is_empty()),
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Embed one query string.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::EmptyQuery`] for blank input,
    /// [`SearchError::EmbedderDisabled`] when no key is configured, and
    /// [`SearchError::Embedding`] on HTTP or parse failures.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let Some(api_key) = &self.api_key else {
            return Err(SearchError::EmbedderDisabled);
        };

        let request = EmbedRequest {
            model: &self.model,
            input: query,
        };
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::Embedding(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SearchError::Embedding(format!(
                "embeddings API returned status {}",
                response.status()
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Embedding(format!("response parse error: {e}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|datum| datum.embedding)
            .ok_or_else(|| SearchError::Embedding("embeddings API returned no data".to_string()))
    }
}

/// Render a vector as a pgvector literal: `[0.10000000,0.20000000,...]`.
#[must_use]
pub fn embedding_literal(embedding: &[f32]) -> String {
    let rendered: Vec<String> = embedding.iter().map(|item| format!("{item:.8}")).collect();
    format!("[{}]", rendered.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn embedding_literal_renders_pgvector_syntax() {
        let literal = embedding_literal(&[0.1, -0.25]);
        assert_eq!(literal, "[0.10000000,-0.25000000]");
    }

    #[test]
    fn embedder_is_disabled_without_a_key() {
        assert!(!QueryEmbedder::new(None, "text-embedding-3-small").enabled());
        assert!(!QueryEmbedder::new(Some(String::new()), "text-embedding-3-small").enabled());
        assert!(QueryEmbedder::new(Some("sk-test".into()), "text-embedding-3-small").enabled());
    }

    #[tokio::test]
    async fn embed_query_parses_the_first_embedding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": "matte lipstick",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.25, -0.5]}],
            })))
            .mount(&server)
            .await;

        let embedder = QueryEmbedder::with_base_url(
            Some("sk-test".into()),
            "text-embedding-3-small",
            server.uri(),
        );
        let vector = embedder.embed_query("matte lipstick").await.expect("embed");
        assert_eq!(vector, vec![0.25, -0.5]);
    }

    #[tokio::test]
    async fn embed_query_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let embedder = QueryEmbedder::with_base_url(
            Some("sk-test".into()),
            "text-embedding-3-small",
            server.uri(),
        );
        let result = embedder.embed_query("anything").await;
        assert!(matches!(result, Err(SearchError::Embedding(_))));
    }

    #[tokio::test]
    async fn embed_query_rejects_blank_input_and_missing_key() {
        let embedder = QueryEmbedder::new(Some("sk-test".into()), "text-embedding-3-small");
        assert!(matches!(
            embedder.embed_query("   ").await,
            Err(SearchError::EmptyQuery)
        ));

        let disabled = QueryEmbedder::new(None, "text-embedding-3-small");
        assert!(matches!(
            disabled.embed_query("query").await,
            Err(SearchError::EmbedderDisabled)
        ));
    }
}
