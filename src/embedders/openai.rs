//! OpenAI embeddings API adapter.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{normalize_input, EmbedderError, EmbeddingResponse, HTTP_TIMEOUT};
use crate::traits::Embedder;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/embeddings";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
    encoding_format: &'static str,
}

/// Embedder backed by `POST /v1/embeddings` on the OpenAI API.
#[derive(Debug)]
pub struct OpenAiEmbedder {
    api_key: String,
    model: String,
    dimension: usize,
    max_tokens: usize,
    client: reqwest::Client,
    api_url: String,
}

impl OpenAiEmbedder {
    /// Build an embedder for `model`, reading `OPENAI_API_KEY` from the
    /// environment. Fails when the key is absent or the model unknown.
    pub fn new(model: &str) -> Result<Self> {
        Self::with_api_url(model, DEFAULT_API_URL)
    }

    /// Same as [`new`](Self::new) but pointed at a custom endpoint. Used
    /// by tests to target a local mock server.
    pub fn with_api_url(model: &str, api_url: &str) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            return Err(EmbedderError::ApiKeyNotSet.into());
        }

        let (dimension, max_tokens) = match model {
            "text-embedding-3-small" => (1536, 8191),
            "text-embedding-3-large" => (3072, 8191),
            "text-embedding-ada-002" => (1536, 8191),
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
impl Embedder for OpenAiEmbedder {
    async fn generate_embedding(&self, content: &str) -> Result<Vec<f32>> {
        if content.is_empty() {
            return Err(EmbedderError::ContentEmpty.into());
        }

        let clean = normalize_input(content);
        let request = EmbeddingRequest {
            input: &clean,
            model: &self.model,
            encoding_format: "float",
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
