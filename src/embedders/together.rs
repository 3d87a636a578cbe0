//! Together embeddings API adapter.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{normalize_input, EmbedderError, EmbeddingResponse, HTTP_TIMEOUT};
use crate::traits::Embedder;

const DEFAULT_API_URL: &str = "https://api.together.xyz/v1/embeddings";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

/// Embedder backed by the Together embeddings endpoint. Both supported
/// retrieval models produce 768-wide vectors; they differ only in input
/// budget.
#[derive(Debug)]
pub struct TogetherAiEmbedder {
    api_key: String,
    model: String,
    dimension: usize,
    max_tokens: usize,
    client: reqwest::Client,
    api_url: String,
}

impl TogetherAiEmbedder {
    /// Build an embedder for `model`, reading `TOGETHER_API_KEY` from the
    /// environment. Fails when the key is absent or the model unknown.
    pub fn new(model: &str) -> Result<Self> {
        Self::with_api_url(model, DEFAULT_API_URL)
    }

    /// Same as [`new`](Self::new) but pointed at a custom endpoint.
    pub fn with_api_url(model: &str, api_url: &str) -> Result<Self> {
        let api_key = std::env::var("TOGETHER_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            return Err(EmbedderError::ApiKeyNotSet.into());
        }

        let (dimension, max_tokens) = match model {
            "togethercomputer/m2-bert-80M-8k-retrieval" => (768, 8192),
            "togethercomputer/m2-bert-80M-32k-retrieval" => (768, 32768),
            _ => return Err(EmbedderError::UnsupportedModel(model.to_string()).into()),
        };

        Ok(Self {
            api_key,
            model: model.to_string(),
            dimension,
            max_tokens,
            client: reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?,
            api_url: api_url.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for TogetherAiEmbedder {
    async fn generate_embedding(&self, content: &str) -> Result<Vec<f32>> {
        if content.is_empty() {
            return Err(EmbedderError::ContentEmpty.into());
        }

        let clean = normalize_input(content);
        let request = EmbeddingRequest {
            input: &clean,
            model: &self.model,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmbedderError::ApiRequestFailed(status.as_u16()).into());
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let vector = parsed.into_vector()?;
        debug!(model = %self.model, dimension = vector.len(), "generated embedding");
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial(together_env)]
    fn missing_api_key_fails_at_construction() {
        std::env::remove_var("TOGETHER_API_KEY");
        let err = TogetherAiEmbedder::new("togethercomputer/m2-bert-80M-8k-retrieval").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EmbedderError>(),
            Some(EmbedderError::ApiKeyNotSet)
        ));
    }

    #[test]
    #[serial(together_env)]
    fn model_table_fixes_dimension_and_budget() {
        std::env::set_var("TOGETHER_API_KEY", "test-key");

        let short = TogetherAiEmbedder::new("togethercomputer/m2-bert-80M-8k-retrieval").unwrap();
        assert_eq!(short.dimension(), 768);
        assert_eq!(short.max_tokens(), 8192);

        let long = TogetherAiEmbedder::new("togethercomputer/m2-bert-80M-32k-retrieval").unwrap();
        assert_eq!(long.dimension(), 768);
        assert_eq!(long.max_tokens(), 32768);

        let err = TogetherAiEmbedder::new("togethercomputer/m2-bert-unknown").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EmbedderError>(),
            Some(EmbedderError::UnsupportedModel(_))
        ));
    }

    #[tokio::test]
    #[serial(together_env)]
    async fn successful_call_returns_the_vector() {
        use wiremock::matchers::{body_partial_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        std::env::set_var("TOGETHER_API_KEY", "test-key");
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "model": "togethercomputer/m2-bert-80M-8k-retrieval",
                "input": "bonjour",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "embedding": [1.0, 2.0], "index": 0, "object": "embedding" }],
                "model": "togethercomputer/m2-bert-80M-8k-retrieval",
                "object": "list"
            })))
            .mount(&server)
            .await;

        let url = format!("{}/v1/embeddings", server.uri());
        let embedder =
            TogetherAiEmbedder::with_api_url("togethercomputer/m2-bert-80M-8k-retrieval", &url)
                .unwrap();

        let vector = embedder.generate_embedding("bonjour").await.unwrap();
        assert_eq!(vector, vec![1.0, 2.0]);
    }

    #[tokio::test]
    #[serial(together_env)]
    async fn empty_data_surfaces_no_embedding_data() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        std::env::set_var("TOGETHER_API_KEY", "test-key");
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "model": "togethercomputer/m2-bert-80M-8k-retrieval",
                "object": "list"
            })))
            .mount(&server)
            .await;

        let url = format!("{}/v1/embeddings", server.uri());
        let embedder =
            TogetherAiEmbedder::with_api_url("togethercomputer/m2-bert-80M-8k-retrieval", &url)
                .unwrap();

        let err = embedder.generate_embedding("hello").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EmbedderError>(),
            Some(EmbedderError::NoEmbeddingData)
        ));
    }
}
