//! Adapter traits for the processing pipeline.
//!
//! The engine is a registry of trait objects keyed by string tag. Five
//! capabilities plug in:
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                ProcessingEngine                  │
//! │  ┌──────────┐ ┌─────────────┐ ┌─────────┐        │
//! │  │Importers │ │Transformers │ │Chunkers │  ...   │
//! │  │ by source│ │ by source   │ │ by      │        │
//! │  │ type     │ │ type        │ │ strategy│        │
//! │  └──────────┘ └─────────────┘ └─────────┘        │
//! └──────────────────────┬───────────────────────────┘
//!                        ▼
//!     import → transform → chunk → embed → persist
//! ```
//!
//! Implementations must be `Send + Sync`: the engine shares them across
//! worker tasks. Adapter methods that perform I/O take the store pool by
//! reference — the engine owns neither the pool nor its lifecycle.
//!
//! Typed error kinds (`ImporterError`, `TransformerError`, `ChunkerError`,
//! `EmbedderError`) travel inside `anyhow::Error` and stay downcastable
//! at the call site.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::importers::ImporterError;
use crate::models::{Chunk, Document, Embedding};

/// Outcome of an import operation.
///
/// Importers that enumerate many items return the identifiers of the most
/// recent successfully persisted pair. When some items failed but at least
/// one succeeded, `error` carries the [`ImporterError::ImportCompleted`]
/// marker and the engine still advances to the transform stage.
#[derive(Debug)]
pub struct ImportResult {
    pub source_id: String,
    pub download_id: String,
    pub error: Option<ImporterError>,
}

/// Outcome of a transform operation.
///
/// The transformer has already written the document and metadata rows;
/// `content` is the markdown-normalized text that flows to the chunker.
#[derive(Debug)]
pub struct TransformResult {
    pub document: Document,
    pub content: String,
    /// Detected language: `en`/`fr` for text, a programming language for
    /// code, or empty when undetermined.
    pub language: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Per-chunk outcome emitted by the engine's worker pool.
#[derive(Debug)]
pub struct ChunkResult {
    pub chunk: Chunk,
    pub embedding: Option<Embedding>,
    pub error: Option<anyhow::Error>,
}

/// Outcome of an update check. The updater surface is accepted by the
/// registry but no concrete updater ships with this crate.
#[derive(Debug)]
pub struct UpdateResult {
    pub source_id: String,
    pub updated: bool,
    pub new_items: usize,
    pub updated_items: usize,
}

/// Tuning knobs for a single pipeline run.
#[derive(Debug, Clone)]
pub struct ProcessingOptions {
    /// Upper bound on tokens per chunk; passed to the chunker.
    pub max_tokens: usize,
    /// Registry key of the chunker; only "token" ships with this crate.
    pub chunk_strategy: String,
    /// Registry key of the embedder; determines the vector dimension.
    pub embedding_model: String,
    /// Number of parallel chunk workers. Must be at least 1: zero spawns
    /// no workers and the chunk stage never completes.
    pub concurrency: usize,
    /// Advisory overall deadline; callers enforce it by wrapping the
    /// engine call (the engine honours whatever cancellation the caller
    /// applies).
    pub timeout: Duration,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            max_tokens: 8191,
            chunk_strategy: "token".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            concurrency: 5,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Imports content from an external source into source + download rows.
#[async_trait]
pub trait Importer: Send + Sync {
    /// Fetch content from `source_url`, persisting one source and one
    /// download row per successfully retrieved item.
    async fn import(&self, source_url: &str, pool: &SqlitePool) -> Result<ImportResult>;

    /// The source type tag this importer handles (e.g. `"github"`).
    fn source_type(&self) -> &'static str;

    /// Check whether `source_url` belongs to this importer. Registered
    /// importers must accept disjoint URL sets: the engine routes a URL
    /// to the first importer that accepts it, in unspecified order.
    fn validate_source(&self, source_url: &str) -> Result<()>;
}

/// Transforms a download into a document plus normalized content.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Convert `download` into a structured document, writing the document
    /// and metadata rows.
    async fn transform(
        &self,
        download: &crate::models::Download,
        pool: &SqlitePool,
    ) -> Result<TransformResult>;

    /// The source type tag this transformer handles.
    fn source_type(&self) -> &'static str;

    /// Cheap structural check that `download` is one this transformer
    /// understands.
    fn can_transform(&self, download: &crate::models::Download) -> bool;
}

/// Splits normalized content into token-bounded chunks.
///
/// Chunking is CPU-only; the trait is synchronous.
pub trait Chunker: Send + Sync {
    /// Split `content` into chunks of at most `max_tokens` tokens, linked
    /// left-to-right in source order.
    fn chunk_document(&self, content: &str, max_tokens: usize) -> Result<Vec<Chunk>>;

    /// The strategy tag this chunker registers under (e.g. `"token"`).
    fn strategy(&self) -> &'static str;
}

/// Generates vector embeddings via a remote model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `content`, returning a vector of exactly
    /// [`dimension`](Embedder::dimension) floats.
    async fn generate_embedding(&self, content: &str) -> Result<Vec<f32>>;

    /// Model tag, used as the registry key.
    fn model_name(&self) -> &str;

    /// Width of the vectors this model produces.
    fn dimension(&self) -> usize;

    /// Largest input, in tokens, the model accepts.
    fn max_tokens(&self) -> usize;
}

/// Detects and applies changes in already-imported sources.
///
/// Part of the plug-in surface for future incremental update support;
/// the registry accepts updaters but the pipeline never invokes them.
#[async_trait]
pub trait Updater: Send + Sync {
    /// Scan known sources for new or changed content.
    async fn check_for_updates(&self, pool: &SqlitePool) -> Result<Vec<UpdateResult>>;

    /// Process updates for one source.
    async fn update_source(&self, source_id: &str, pool: &SqlitePool) -> Result<UpdateResult>;

    /// The source type tag this updater handles.
    fn source_type(&self) -> &'static str;
}
