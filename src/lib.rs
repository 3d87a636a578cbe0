//! # Quarry
//!
//! **A web content ingestion and embedding pipeline.**
//!
//! Quarry pulls textual content out of heterogeneous web sources,
//! normalizes it into markdown documents, segments those into
//! token-bounded chunks, generates vector embeddings for each chunk, and
//! persists the entire lineage — source → download → document → chunks →
//! embeddings — in SQLite so downstream search can retrieve by vector
//! similarity.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐    ┌──────────────────┐    ┌─────────────┐
//! │ Importers  │──▶│ ProcessingEngine  │──▶│   SQLite     │
//! │ github     │    │ transform·chunk  │    │ full lineage │
//! │ wp-json    │    │ embed (workers)  │    │ 9 tables     │
//! └────────────┘    └──────────────────┘    └─────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. An **importer** ([`importers`]) enumerates the items behind a URL
//!    and persists a source + download row per item.
//! 2. A **transformer** ([`transformers`]) normalizes a download into a
//!    markdown document with metadata rows.
//! 3. The **token chunker** ([`chunkers`]) splits the content into
//!    chunks of at most N BPE tokens, linked left-to-right.
//! 4. The **engine** ([`engine`]) fans chunks across a worker pool; each
//!    worker calls an **embedder** ([`embedders`]) and commits the chunk
//!    with its embedding in one transaction.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Adapter registry and pipeline orchestration |
//! | [`traits`] | Importer / Transformer / Chunker / Embedder / Updater contracts |
//! | [`chunkers`] | Token-bounded chunking against a BPE encoding |
//! | [`embedders`] | OpenAI and Together embedding API adapters |
//! | [`importers`] | Repository-crawl and paginated-JSON importers |
//! | [`transformers`] | Repo-file and post-payload transformers |
//! | [`models`] | Entity structs mirroring the persisted tables |
//! | [`repository`] | Row-level CRUD behind the CLI |
//! | [`db`] | Connection pool from environment credentials |
//! | [`migrate`] | Idempotent schema migrations |
//! | [`config`] | Process-wide env-driven configuration |
//! | [`logging`] | Structured logging (pretty locally, JSON elsewhere) |

pub mod chunkers;
pub mod config;
pub mod db;
pub mod embedders;
pub mod engine;
pub mod importers;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod repository;
pub mod traits;
pub mod transformers;

pub use engine::{EngineError, ProcessingEngine};
pub use traits::ProcessingOptions;
