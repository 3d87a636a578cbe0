//! Token-based chunking against a BPE encoding.
//!
//! The whole content is encoded once; chunks are decoded back from
//! non-overlapping (or overlapping) windows of the token array. Window
//! boundaries fall between tokens, so the decoded concatenation of
//! non-overlapping chunks reproduces the semantic content but byte
//! identity across window edges is not guaranteed — callers that need it
//! must stay within a single chunk.

use anyhow::Result;
use thiserror::Error;
use tiktoken_rs::CoreBPE;
use uuid::Uuid;

use crate::config::ChunkerConfig;
use crate::models::Chunk;
use crate::traits::Chunker;

#[derive(Debug, Error)]
pub enum ChunkerError {
    #[error("content cannot be empty")]
    ContentEmpty,
    #[error("max_tokens must be positive")]
    InvalidMaxTokens,
    #[error("overlap_tokens must be between 0 and max_tokens")]
    InvalidOverlap,
}

/// Splits content into chunks of at most N tokens under a named BPE
/// encoding.
///
/// The encoding is resolved once at construction from
/// [`ChunkerConfig::tokenizer`]; unknown names silently fall back to
/// `cl100k_base`.
pub struct TokenChunker {
    encoding: CoreBPE,
    tokenizer_name: String,
    default_max_tokens: usize,
    default_overlap_tokens: usize,
}

impl TokenChunker {
    pub fn new(config: &ChunkerConfig) -> Result<Self> {
        let (encoding, tokenizer_name) = resolve_encoding(&config.tokenizer)?;
        Ok(Self {
            encoding,
            tokenizer_name,
            default_max_tokens: config.default_max_tokens,
            default_overlap_tokens: config.default_overlap_tokens,
        })
    }

    /// Construct from process environment configuration.
    pub fn from_env() -> Result<Self> {
        Self::new(&ChunkerConfig::from_env())
    }

    /// Default token budget when the caller passes none.
    pub fn default_max_tokens(&self) -> usize {
        self.default_max_tokens
    }

    /// Default overlap when the caller passes none.
    pub fn default_overlap_tokens(&self) -> usize {
        self.default_overlap_tokens
    }

    /// Number of tokens in `text` under the configured encoding.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.encoding.encode_ordinary(text).len()
    }

    /// Split `content` into chunks whose token windows overlap by
    /// `overlap_tokens`. The stride is `max_tokens - overlap_tokens`; the
    /// walk stops once a window reaches the end of the token array.
    pub fn chunk_with_overlap(
        &self,
        content: &str,
        max_tokens: usize,
        overlap_tokens: usize,
    ) -> Result<Vec<Chunk>> {
        if content.is_empty() {
            return Err(ChunkerError::ContentEmpty.into());
        }
        if max_tokens == 0 {
            return Err(ChunkerError::InvalidMaxTokens.into());
        }
        if overlap_tokens >= max_tokens {
            return Err(ChunkerError::InvalidOverlap.into());
        }

        self.chunk_windows(content, max_tokens, max_tokens - overlap_tokens)
    }

    /// Walk the token array in windows of `max_tokens`, advancing by
    /// `stride`, decoding each window into a linked chunk.
    fn chunk_windows(&self, content: &str, max_tokens: usize, stride: usize) -> Result<Vec<Chunk>> {
        let tokens = self.encoding.encode_ordinary(content);
        let total = tokens.len();

        if total <= max_tokens {
            return Ok(vec![self.single_chunk(content, total)]);
        }

        let mut chunks: Vec<Chunk> = Vec::with_capacity(total.div_ceil(stride));
        let mut previous_id: Option<String> = None;
        let mut start = 0;

        while start < total {
            let end = (start + max_tokens).min(total);
            let window = tokens[start..end].to_vec();
            let token_count = window.len();
            let body = self.encoding.decode(window)?;

            let id = Uuid::new_v4().to_string();
            let mut chunk = Chunk::new(id.clone());
            chunk.byte_size = Some(body.len() as i64);
            chunk.body = Some(body);
            chunk.tokenizer = Some(self.tokenizer_name.clone());
            chunk.token_count = Some(token_count as i64);
            chunk.left_chunk_id = previous_id.clone();

            if let Some(last) = chunks.last_mut() {
                last.right_chunk_id = Some(id.clone());
            }

            chunks.push(chunk);
            previous_id = Some(id);

            if end >= total {
                break;
            }
            start += stride;
        }

        Ok(chunks)
    }

    /// Content that fits one window is passed through verbatim so the
    /// chunk body equals the input byte-for-byte.
    fn single_chunk(&self, content: &str, token_count: usize) -> Chunk {
        let mut chunk = Chunk::new(Uuid::new_v4().to_string());
        chunk.body = Some(content.to_string());
        chunk.byte_size = Some(content.len() as i64);
        chunk.tokenizer = Some(self.tokenizer_name.clone());
        chunk.token_count = Some(token_count as i64);
        chunk
    }
}

impl Chunker for TokenChunker {
    fn chunk_document(&self, content: &str, max_tokens: usize) -> Result<Vec<Chunk>> {
        if content.is_empty() {
            return Err(ChunkerError::ContentEmpty.into());
        }
        if max_tokens == 0 {
            return Err(ChunkerError::InvalidMaxTokens.into());
        }

        self.chunk_windows(content, max_tokens, max_tokens)
    }

    fn strategy(&self) -> &'static str {
        "token"
    }
}

/// Resolve an encoding name to its codec, falling back to `cl100k_base`
/// for unknown names.
fn resolve_encoding(name: &str) -> Result<(CoreBPE, String)> {
    match name.to_lowercase().as_str() {
        "p50k_base" => Ok((tiktoken_rs::p50k_base()?, "p50k_base".to_string())),
        "r50k_base" => Ok((tiktoken_rs::r50k_base()?, "r50k_base".to_string())),
        _ => Ok((tiktoken_rs::cl100k_base()?, "cl100k_base".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> TokenChunker {
        TokenChunker::new(&ChunkerConfig::default()).unwrap()
    }

    #[test]
    fn empty_content_is_rejected() {
        let err = chunker().chunk_document("", 100).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChunkerError>(),
            Some(ChunkerError::ContentEmpty)
        ));
    }

    #[test]
    fn zero_max_tokens_is_rejected() {
        let err = chunker().chunk_document("hello", 0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChunkerError>(),
            Some(ChunkerError::InvalidMaxTokens)
        ));
    }

    #[test]
    fn short_content_yields_single_verbatim_chunk() {
        let content = "Hello world, this is a test.";
        let chunks = chunker().chunk_document(content, 100).unwrap();

        assert_eq!(chunks.len(), 1);
        let only = &chunks[0];
        assert_eq!(only.body.as_deref(), Some(content));
        assert_eq!(only.byte_size, Some(content.len() as i64));
        assert_eq!(only.tokenizer.as_deref(), Some("cl100k_base"));
        assert!(only.token_count.unwrap() > 0);
        assert!(only.left_chunk_id.is_none());
        assert!(only.right_chunk_id.is_none());
    }

    #[test]
    fn every_chunk_respects_the_token_budget() {
        let content = "The quick brown fox jumps over the lazy dog. ".repeat(50);
        let max_tokens = 16;
        let chunks = chunker().chunk_document(&content, max_tokens).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_count.unwrap() <= max_tokens as i64);
        }
    }

    #[test]
    fn sibling_linkage_forms_a_doubly_linked_list() {
        let content = "word ".repeat(200);
        let chunks = chunker().chunk_document(&content, 10).unwrap();

        assert!(chunks.len() > 2);
        assert!(chunks.first().unwrap().left_chunk_id.is_none());
        assert!(chunks.last().unwrap().right_chunk_id.is_none());

        for pair in chunks.windows(2) {
            assert_eq!(pair[0].right_chunk_id.as_deref(), Some(pair[1].id.as_str()));
            assert_eq!(pair[1].left_chunk_id.as_deref(), Some(pair[0].id.as_str()));
        }
    }

    #[test]
    fn parents_stay_absent_under_token_chunking() {
        let content = "word ".repeat(100);
        for chunk in chunker().chunk_document(&content, 10).unwrap() {
            assert!(chunk.parent_chunk_id.is_none());
        }
    }

    #[test]
    fn overlap_must_be_smaller_than_budget() {
        let err = chunker()
            .chunk_with_overlap("some content here", 10, 10)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChunkerError>(),
            Some(ChunkerError::InvalidOverlap)
        ));
    }

    #[test]
    fn overlapping_windows_advance_by_the_stride() {
        let c = chunker();
        let content = "alpha beta gamma delta ".repeat(40);
        let tokens = c.count_tokens(&content);
        let (max_tokens, overlap) = (20, 5);

        let chunks = c.chunk_with_overlap(&content, max_tokens, overlap).unwrap();

        // stride 15: expected window starts at 0, 15, 30, ...
        let stride = max_tokens - overlap;
        let expected = tokens.saturating_sub(overlap).div_ceil(stride);
        assert_eq!(chunks.len(), expected);
        for chunk in &chunks {
            assert!(chunk.token_count.unwrap() <= max_tokens as i64);
        }
    }

    #[test]
    fn unknown_tokenizer_falls_back_to_cl100k() {
        let cfg = ChunkerConfig {
            tokenizer: "no-such-encoding".to_string(),
            ..ChunkerConfig::default()
        };
        let c = TokenChunker::new(&cfg).unwrap();
        let chunks = c.chunk_document("hello there", 100).unwrap();
        assert_eq!(chunks[0].tokenizer.as_deref(), Some("cl100k_base"));
    }

    #[test]
    fn count_tokens_matches_chunk_totals() {
        let c = chunker();
        let content = "counting tokens is deterministic";
        let total = c.count_tokens(content);
        let chunks = c.chunk_document(content, 1000).unwrap();
        assert_eq!(chunks[0].token_count, Some(total as i64));
    }
}
