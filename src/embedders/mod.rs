//! Embedding provider adapters.
//!
//! Two providers ship with the crate, both speaking the OpenAI-compatible
//! embeddings wire shape over `Authorization: Bearer` auth:
//!
//! | Model | Dimension | Max tokens | Credential |
//! |-------|----------:|-----------:|------------|
//! | `text-embedding-3-small` | 1536 | 8191 | `OPENAI_API_KEY` |
//! | `text-embedding-3-large` | 3072 | 8191 | `OPENAI_API_KEY` |
//! | `text-embedding-ada-002` | 1536 | 8191 | `OPENAI_API_KEY` |
//! | `togethercomputer/m2-bert-80M-8k-retrieval` | 768 | 8192 | `TOGETHER_API_KEY` |
//! | `togethercomputer/m2-bert-80M-32k-retrieval` | 768 | 32768 | `TOGETHER_API_KEY` |
//!
//! Constructors fail fast: a missing credential or an unknown model name
//! is an error before any request is made. Requests use a shared
//! `reqwest::Client` with a 30 second timeout. There is no retry.

mod openai;
mod together;

pub use openai::OpenAiEmbedder;
pub use together::TogetherAiEmbedder;

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("API key not set")]
    ApiKeyNotSet,
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("content is empty")]
    ContentEmpty,
    #[error("API request failed with status {0}")]
    ApiRequestFailed(u16),
    #[error("no embedding data in response")]
    NoEmbeddingData,
}

/// One embedding vector in a provider response.
#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingData {
    pub embedding: Vec<f32>,
}

/// Response shape shared by both providers:
/// `{ "data": [{ "embedding": [...] }], ... }`.
#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingResponse {
    #[serde(default)]
    pub data: Vec<EmbeddingData>,
}

impl EmbeddingResponse {
    /// Pull the first vector out, failing on an empty data array.
    pub fn into_vector(self) -> Result<Vec<f32>, EmbedderError> {
        self.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbedderError::NoEmbeddingData)
    }
}

/// Replace newlines with spaces and trim; embedding models treat newlines
/// as semantically void and some tokenize them wastefully.
pub(crate) fn normalize_input(content: &str) -> String {
    content.replace('\n', " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_newlines_and_trims() {
        assert_eq!(normalize_input("  a\nb\n"), "a b");
        assert_eq!(normalize_input("\n\n"), "");
    }

    #[test]
    fn response_with_data_yields_first_vector() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"embedding":[0.1,0.2]},{"embedding":[0.3]}],"model":"m","usage":{"prompt_tokens":2,"total_tokens":2}}"#,
        )
        .unwrap();
        assert_eq!(response.into_vector().unwrap(), vec![0.1, 0.2]);
    }

    #[test]
    fn empty_data_array_is_an_error() {
        let response: EmbeddingResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert!(matches!(
            response.into_vector(),
            Err(EmbedderError::NoEmbeddingData)
        ));
    }
}
