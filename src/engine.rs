//! The processing engine: adapter registry and pipeline orchestrator.
//!
//! The engine owns five registries keyed by string tag — importers and
//! transformers by source type, chunkers by strategy, embedders by model
//! name, updaters by source type — all guarded by a single read-write
//! lock. Registration takes the write lock and admits exactly one adapter
//! per tag; lookups take the read lock. No other engine state is mutable,
//! so the engine is safe to share across tasks.
//!
//! # Pipeline
//!
//! ```text
//! process_source(url)
//!     │  route URL to the first importer that validates it
//!     ▼
//! Importer::import ──▶ (source, download) rows
//!     │
//!     ▼
//! process_document(download_id)
//!     │  resolve source type from the stored source's host
//!     ▼
//! Transformer::transform ──▶ (document, metadata) rows + markdown content
//!     │
//!     ▼
//! Chunker::chunk_document ──▶ ordered, linked chunks
//!     │
//!     ▼
//! worker pool (N = options.concurrency)
//!     each worker: embed body → pick vector column → write chunk +
//!     embedding in one transaction → emit one result
//! ```
//!
//! # Source-type resolution
//!
//! From a URL, the first registered importer whose `validate_source`
//! accepts it wins; iteration order is unspecified, so registered
//! validators must accept disjoint URL sets. From a stored source, a host
//! heuristic applies: `github.com` / `api.github.com` map to "github" and
//! any other host to "wp-json" — unknown hosts are coerced into the
//! paginated-JSON pipeline, a known limitation of the heuristic.
//!
//! # Failure semantics
//!
//! There are no retries. Importer, transformer, and chunker failures abort
//! the operation. Embedding and per-chunk persistence failures are
//! collected: the orchestrator always drains one result per dispatched
//! chunk, then surfaces a single [`EngineError::ChunkProcessingFailed`] —
//! chunks that committed before the failure stay committed.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{format_timestamp, Chunk, Embedding, EmbeddingVector, Source};
use crate::repository::downloads::get_download;
use crate::repository::sources::get_source;
use crate::traits::{
    Chunker, ChunkResult, Embedder, Importer, ProcessingOptions, Transformer, Updater,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("importer already registered for source type")]
    ImporterAlreadyRegistered,
    #[error("transformer already registered for source type")]
    TransformerAlreadyRegistered,
    #[error("chunker already registered for strategy")]
    ChunkerAlreadyRegistered,
    #[error("embedder already registered for model")]
    EmbedderAlreadyRegistered,
    #[error("updater already registered for source type")]
    UpdaterAlreadyRegistered,
    #[error("no importer registered for source type")]
    NoImporterRegistered,
    #[error("no transformer registered for source type")]
    NoTransformerRegistered,
    #[error("no chunker registered for strategy")]
    NoChunkerRegistered,
    #[error("no embedder registered for model")]
    NoEmbedderRegistered,
    #[error("no importer can handle URL")]
    NoImporterCanHandle,
    #[error("cannot determine source type from source")]
    CannotDetermineSourceType,
    #[error("unsupported embedding dimension {0}")]
    UnsupportedEmbeddingDim(usize),
    #[error("chunk processing failed")]
    ChunkProcessingFailed,
}

#[derive(Default)]
struct Registries {
    importers: HashMap<String, Arc<dyn Importer>>,
    transformers: HashMap<String, Arc<dyn Transformer>>,
    chunkers: HashMap<String, Arc<dyn Chunker>>,
    embedders: HashMap<String, Arc<dyn Embedder>>,
    updaters: HashMap<String, Arc<dyn Updater>>,
}

/// Registry + orchestrator for the import → transform → chunk → embed
/// pipeline. Create once, register adapters, share by reference.
#[derive(Default)]
pub struct ProcessingEngine {
    registries: RwLock<Registries>,
}

impl ProcessingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_importer(&self, importer: Arc<dyn Importer>) -> Result<(), EngineError> {
        let mut reg = self.registries.write().expect("registry lock poisoned");
        let source_type = importer.source_type().to_string();
        if reg.importers.contains_key(&source_type) {
            error!(%source_type, "importer already registered");
            return Err(EngineError::ImporterAlreadyRegistered);
        }
        info!(%source_type, "registered importer");
        reg.importers.insert(source_type, importer);
        Ok(())
    }

    pub fn register_transformer(
        &self,
        transformer: Arc<dyn Transformer>,
    ) -> Result<(), EngineError> {
        let mut reg = self.registries.write().expect("registry lock poisoned");
        let source_type = transformer.source_type().to_string();
        if reg.transformers.contains_key(&source_type) {
            error!(%source_type, "transformer already registered");
            return Err(EngineError::TransformerAlreadyRegistered);
        }
        info!(%source_type, "registered transformer");
        reg.transformers.insert(source_type, transformer);
        Ok(())
    }

    pub fn register_chunker(&self, chunker: Arc<dyn Chunker>) -> Result<(), EngineError> {
        let mut reg = self.registries.write().expect("registry lock poisoned");
        let strategy = chunker.strategy().to_string();
        if reg.chunkers.contains_key(&strategy) {
            error!(%strategy, "chunker already registered");
            return Err(EngineError::ChunkerAlreadyRegistered);
        }
        info!(%strategy, "registered chunker");
        reg.chunkers.insert(strategy, chunker);
        Ok(())
    }

    pub fn register_embedder(&self, embedder: Arc<dyn Embedder>) -> Result<(), EngineError> {
        let mut reg = self.registries.write().expect("registry lock poisoned");
        let model_name = embedder.model_name().to_string();
        if reg.embedders.contains_key(&model_name) {
            error!(%model_name, "embedder already registered");
            return Err(EngineError::EmbedderAlreadyRegistered);
        }
        info!(%model_name, "registered embedder");
        reg.embedders.insert(model_name, embedder);
        Ok(())
    }

    pub fn register_updater(&self, updater: Arc<dyn Updater>) -> Result<(), EngineError> {
        let mut reg = self.registries.write().expect("registry lock poisoned");
        let source_type = updater.source_type().to_string();
        if reg.updaters.contains_key(&source_type) {
            error!(%source_type, "updater already registered");
            return Err(EngineError::UpdaterAlreadyRegistered);
        }
        info!(%source_type, "registered updater");
        reg.updaters.insert(source_type, updater);
        Ok(())
    }

    /// Run the complete pipeline for a URL: import, then transform,
    /// chunk, and embed the resulting download.
    pub async fn process_source(
        &self,
        source_url: &str,
        options: &ProcessingOptions,
        pool: &SqlitePool,
    ) -> Result<()> {
        let source_type = self.determine_source_type(source_url)?;

        let importer = {
            let reg = self.registries.read().expect("registry lock poisoned");
            reg.importers
                .get(&source_type)
                .cloned()
                .ok_or(EngineError::NoImporterRegistered)?
        };

        info!(source_url, %source_type, "starting import");
        let import_result = importer.import(source_url, pool).await?;
        if let Some(marker) = &import_result.error {
            warn!(source_url, error = %marker, "import finished partially");
        }

        self.process_document(&import_result.download_id, options, pool)
            .await
    }

    /// Run transform → chunk → embed for an existing download.
    pub async fn process_document(
        &self,
        download_id: &str,
        options: &ProcessingOptions,
        pool: &SqlitePool,
    ) -> Result<()> {
        let download = get_download(pool, download_id).await?;
        let source = get_source(pool, &download.source_id).await?;
        let source_type = self.determine_source_type_from_source(&source)?;

        let (transformer, chunker, embedder) = {
            let reg = self.registries.read().expect("registry lock poisoned");
            let transformer = reg
                .transformers
                .get(&source_type)
                .cloned()
                .ok_or(EngineError::NoTransformerRegistered)?;
            let chunker = reg
                .chunkers
                .get(&options.chunk_strategy)
                .cloned()
                .ok_or(EngineError::NoChunkerRegistered)?;
            let embedder = reg
                .embedders
                .get(&options.embedding_model)
                .cloned()
                .ok_or(EngineError::NoEmbedderRegistered)?;
            (transformer, chunker, embedder)
        };

        info!(download_id, %source_type, "starting transformation");
        let transform_result = transformer.transform(&download, pool).await?;

        info!(
            document_id = %transform_result.document.id,
            chunk_strategy = %options.chunk_strategy,
            max_tokens = options.max_tokens,
            "starting chunking"
        );
        let mut chunks = chunker.chunk_document(&transform_result.content, options.max_tokens)?;

        for chunk in &mut chunks {
            stamp_language(chunk, &transform_result.language);
        }

        info!(
            chunk_count = chunks.len(),
            embedding_model = %options.embedding_model,
            concurrency = options.concurrency,
            "starting embedding"
        );
        self.process_chunks(
            chunks,
            &transform_result.document.id,
            embedder,
            pool,
            options.concurrency,
        )
        .await
    }

    /// Ask each registered importer to validate the URL; the first
    /// acceptance wins.
    fn determine_source_type(&self, source_url: &str) -> Result<String, EngineError> {
        let reg = self.registries.read().expect("registry lock poisoned");

        for (source_type, importer) in &reg.importers {
            if importer.validate_source(source_url).is_ok() {
                return Ok(source_type.clone());
            }
        }

        error!(source_url, "no importer can handle this source");
        Err(EngineError::NoImporterCanHandle)
    }

    /// Host heuristic for stored sources; see the module docs for the
    /// known limitation around non-GitHub hosts.
    fn determine_source_type_from_source(&self, source: &Source) -> Result<String, EngineError> {
        match source.host.as_deref() {
            Some("github.com") | Some("api.github.com") => Ok("github".to_string()),
            Some(_) => Ok("wp-json".to_string()),
            None => {
                error!(
                    source_url = source.raw_url.as_deref().unwrap_or_default(),
                    "failed to determine source type from source"
                );
                Err(EngineError::CannotDetermineSourceType)
            }
        }
    }

    /// Fan `chunks` out across `concurrency` workers and drain exactly
    /// one result per chunk.
    async fn process_chunks(
        &self,
        chunks: Vec<Chunk>,
        document_id: &str,
        embedder: Arc<dyn Embedder>,
        pool: &SqlitePool,
        concurrency: usize,
    ) -> Result<()> {
        let total = chunks.len();
        if total == 0 {
            return Ok(());
        }

        let (job_tx, job_rx) = flume::bounded::<Chunk>(total);
        let (result_tx, result_rx) = flume::bounded::<ChunkResult>(total);

        for _ in 0..concurrency {
            tokio::spawn(chunk_worker(
                job_rx.clone(),
                result_tx.clone(),
                document_id.to_string(),
                Arc::clone(&embedder),
                pool.clone(),
            ));
        }
        drop(job_rx);
        drop(result_tx);

        for chunk in chunks {
            // Buffered to the chunk count; never blocks.
            job_tx
                .send_async(chunk)
                .await
                .map_err(|_| EngineError::ChunkProcessingFailed)?;
        }
        drop(job_tx);

        let mut failures = 0usize;
        for _ in 0..total {
            let result = result_rx
                .recv_async()
                .await
                .map_err(|_| EngineError::ChunkProcessingFailed)?;
            if let Some(err) = &result.error {
                error!(chunk_id = %result.chunk.id, error = %err, "chunk processing failed");
                failures += 1;
            }
        }

        if failures > 0 {
            error!(failures, total, "chunk processing failed");
            return Err(EngineError::ChunkProcessingFailed.into());
        }

        Ok(())
    }
}

/// Stamp the transform-stage language onto a chunk, respecting the
/// store's column constraints.
fn stamp_language(chunk: &mut Chunk, language: &str) {
    match language {
        "en" | "fr" => chunk.natural_lang = Some(language.to_string()),
        "python" | "sql" | "javascript" => chunk.code_lang = Some(language.to_string()),
        _ => {}
    }
}

/// Consume chunks until the job channel closes, emitting exactly one
/// result per consumed chunk.
async fn chunk_worker(
    jobs: flume::Receiver<Chunk>,
    results: flume::Sender<ChunkResult>,
    document_id: String,
    embedder: Arc<dyn Embedder>,
    pool: SqlitePool,
) {
    while let Ok(mut chunk) = jobs.recv_async().await {
        chunk.document_id = document_id.clone();
        // Chunkers assign ids up front so sibling links stay valid;
        // only id-less chunks get a fresh one here.
        if chunk.id.is_empty() {
            chunk.id = Uuid::new_v4().to_string();
        }

        let mut embedding: Option<Embedding> = None;
        let mut failure: Option<anyhow::Error> = None;

        if let Some(body) = chunk.body.clone() {
            match embedder.generate_embedding(&body).await {
                Ok(vector) => {
                    let dimension = embedder.dimension();
                    match EmbeddingVector::from_dimension(dimension, vector) {
                        Some(vector) => {
                            embedding = Some(Embedding {
                                id: Uuid::new_v4().to_string(),
                                vector,
                                model: Some(embedder.model_name().to_string()),
                                embedded_at: chrono::Utc::now(),
                                object_id: chunk.id.clone(),
                                object_type: "chunk".to_string(),
                            });
                        }
                        None => {
                            error!(
                                model_name = embedder.model_name(),
                                dimension, "unsupported embedding dimension"
                            );
                            failure = Some(EngineError::UnsupportedEmbeddingDim(dimension).into());
                        }
                    }
                }
                Err(err) => failure = Some(err.context("embedding generation failed")),
            }
        }

        if failure.is_none() {
            if let Err(err) = save_chunk_and_embedding(&pool, &chunk, embedding.as_ref()).await {
                error!(chunk_id = %chunk.id, error = %err, "failed to save chunk and embedding");
                failure = Some(err);
            }
        }

        let _ = results
            .send_async(ChunkResult {
                chunk,
                embedding,
                error: failure,
            })
            .await;
    }
}

/// Write a chunk and its embedding atomically. The transaction rolls
/// back on drop if either insert fails.
async fn save_chunk_and_embedding(
    pool: &SqlitePool,
    chunk: &Chunk,
    embedding: Option<&Embedding>,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO chunks (id, document_id, parent_chunk_id, left_chunk_id, right_chunk_id,
                            body, byte_size, tokenizer, token_count, natural_lang, code_lang)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&chunk.id)
    .bind(&chunk.document_id)
    .bind(&chunk.parent_chunk_id)
    .bind(&chunk.left_chunk_id)
    .bind(&chunk.right_chunk_id)
    .bind(&chunk.body)
    .bind(chunk.byte_size)
    .bind(&chunk.tokenizer)
    .bind(chunk.token_count)
    .bind(&chunk.natural_lang)
    .bind(&chunk.code_lang)
    .execute(&mut *tx)
    .await?;

    if let Some(embedding) = embedding {
        let query = format!(
            "INSERT INTO embeddings (id, {}, model, embedded_at, object_id, object_type)
             VALUES (?, ?, ?, ?, ?, ?)",
            embedding.vector.column()
        );

        sqlx::query(&query)
            .bind(&embedding.id)
            .bind(embedding.vector.to_column_text())
            .bind(&embedding.model)
            .bind(format_timestamp(&embedding.embedded_at))
            .bind(&embedding.object_id)
            .bind(&embedding.object_type)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticImporter {
        tag: &'static str,
        accepts: &'static str,
    }

    #[async_trait]
    impl Importer for StaticImporter {
        async fn import(
            &self,
            _source_url: &str,
            _pool: &SqlitePool,
        ) -> Result<crate::traits::ImportResult> {
            unimplemented!("registration-only test importer")
        }

        fn source_type(&self) -> &'static str {
            self.tag
        }

        fn validate_source(&self, source_url: &str) -> Result<()> {
            if source_url.contains(self.accepts) {
                Ok(())
            } else {
                Err(anyhow::anyhow!("not mine"))
            }
        }
    }

    struct StaticEmbedder {
        model: &'static str,
        dimension: usize,
        calls: AtomicUsize,
        fail: bool,
    }

    impl StaticEmbedder {
        fn new(model: &'static str, dimension: usize) -> Self {
            Self {
                model,
                dimension,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Embedder for StaticEmbedder {
        async fn generate_embedding(&self, _content: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow::anyhow!("embedder offline"));
            }
            Ok(vec![0.1; self.dimension])
        }

        fn model_name(&self) -> &str {
            self.model
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn max_tokens(&self) -> usize {
            8191
        }
    }

    fn importer(tag: &'static str, accepts: &'static str) -> Arc<dyn Importer> {
        Arc::new(StaticImporter { tag, accepts })
    }

    fn source_with_host(host: Option<&str>) -> Source {
        Source {
            id: "src-1".to_string(),
            author_email: None,
            raw_url: None,
            scheme: None,
            host: host.map(|h| h.to_string()),
            path: None,
            query: None,
            active_domain: 1,
            format: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let engine = ProcessingEngine::new();

        engine
            .register_importer(importer("github", "github.com"))
            .unwrap();
        let err = engine
            .register_importer(importer("github", "github.com"))
            .unwrap_err();
        assert!(matches!(err, EngineError::ImporterAlreadyRegistered));
    }

    #[test]
    fn parallel_registration_admits_exactly_one_winner() {
        let engine = Arc::new(ProcessingEngine::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(std::thread::spawn(move || {
                engine
                    .register_importer(importer("wp-json", "/wp-json/"))
                    .is_ok()
            }));
        }

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|registered| *registered)
            .count();
        assert_eq!(successes, 1);
    }

    #[test]
    fn url_routing_picks_the_accepting_importer() {
        let engine = ProcessingEngine::new();
        engine
            .register_importer(importer("github", "github.com"))
            .unwrap();
        engine
            .register_importer(importer("wp-json", "/wp-json/"))
            .unwrap();

        assert_eq!(
            engine
                .determine_source_type("https://github.com/owner/repo")
                .unwrap(),
            "github"
        );
        assert_eq!(
            engine
                .determine_source_type("https://blog.example.com/wp-json/wp/v2/posts")
                .unwrap(),
            "wp-json"
        );

        let err = engine
            .determine_source_type("https://nobody.example.com/feed")
            .unwrap_err();
        assert!(matches!(err, EngineError::NoImporterCanHandle));
    }

    #[test]
    fn stored_source_resolution_uses_the_host_heuristic() {
        let engine = ProcessingEngine::new();

        assert_eq!(
            engine
                .determine_source_type_from_source(&source_with_host(Some("github.com")))
                .unwrap(),
            "github"
        );
        assert_eq!(
            engine
                .determine_source_type_from_source(&source_with_host(Some("api.github.com")))
                .unwrap(),
            "github"
        );
        assert_eq!(
            engine
                .determine_source_type_from_source(&source_with_host(Some("blog.example.com")))
                .unwrap(),
            "wp-json"
        );

        let err = engine
            .determine_source_type_from_source(&source_with_host(None))
            .unwrap_err();
        assert!(matches!(err, EngineError::CannotDetermineSourceType));
    }

    #[test]
    fn language_stamping_respects_column_constraints() {
        let mut chunk = Chunk::new("c".to_string());

        stamp_language(&mut chunk, "fr");
        assert_eq!(chunk.natural_lang.as_deref(), Some("fr"));
        assert!(chunk.code_lang.is_none());

        let mut chunk = Chunk::new("c".to_string());
        stamp_language(&mut chunk, "python");
        assert_eq!(chunk.code_lang.as_deref(), Some("python"));
        assert!(chunk.natural_lang.is_none());

        let mut chunk = Chunk::new("c".to_string());
        stamp_language(&mut chunk, "rust");
        assert!(chunk.natural_lang.is_none() && chunk.code_lang.is_none());
    }

    // Worker-pool tests against a real temp store.

    async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("engine-test.db");
        let pool = crate::db::connect_to(db_path.to_str().unwrap()).await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        (dir, pool)
    }

    async fn seed_document(pool: &SqlitePool) -> String {
        let now = format_timestamp(&chrono::Utc::now());
        sqlx::query(
            "INSERT INTO sources (id, raw_url, active_domain, created_at, updated_at)
             VALUES ('src-1', 'https://blog.example.com/wp-json/wp/v2/posts/1', 1, ?, ?)",
        )
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO downloads (id, source_id, headers, body) VALUES ('dl-1', 'src-1', '{}', 'x')",
        )
        .execute(pool)
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO documents (id, source_id, download_id, min_chunk_size, max_chunk_size)
             VALUES ('doc-1', 'src-1', 'dl-1', 212, 8191)",
        )
        .execute(pool)
        .await
        .unwrap();

        "doc-1".to_string()
    }

    fn body_chunk(body: &str) -> Chunk {
        let mut chunk = Chunk::new(String::new());
        chunk.body = Some(body.to_string());
        chunk.byte_size = Some(body.len() as i64);
        chunk.token_count = Some(1);
        chunk.tokenizer = Some("cl100k_base".to_string());
        chunk
    }

    #[tokio::test]
    async fn worker_pool_commits_every_chunk_with_its_embedding() {
        let (_dir, pool) = test_pool().await;
        let document_id = seed_document(&pool).await;

        let engine = ProcessingEngine::new();
        let embedder = Arc::new(StaticEmbedder::new("test-model", 768));

        let chunks: Vec<Chunk> = (0..7).map(|i| body_chunk(&format!("chunk {i}"))).collect();
        engine
            .process_chunks(chunks, &document_id, embedder.clone(), &pool, 3)
            .await
            .unwrap();

        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(chunk_count, 7);

        let embedding_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE embedding_768 IS NOT NULL")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(embedding_count, 7);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 7);

        let object_types: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE object_type = 'chunk'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(object_types, 7);
    }

    #[tokio::test]
    async fn bodyless_chunks_are_written_without_embeddings() {
        let (_dir, pool) = test_pool().await;
        let document_id = seed_document(&pool).await;

        let engine = ProcessingEngine::new();
        let embedder = Arc::new(StaticEmbedder::new("test-model", 768));

        let mut empty = Chunk::new(String::new());
        empty.body = None;
        let chunks = vec![empty, body_chunk("has body")];

        engine
            .process_chunks(chunks, &document_id, embedder.clone(), &pool, 2)
            .await
            .unwrap();

        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(chunk_count, 2);

        let embedding_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(embedding_count, 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsupported_dimension_fails_the_operation() {
        let (_dir, pool) = test_pool().await;
        let document_id = seed_document(&pool).await;

        let engine = ProcessingEngine::new();
        let embedder = Arc::new(StaticEmbedder::new("bad-model", 999));

        let err = engine
            .process_chunks(vec![body_chunk("x")], &document_id, embedder, &pool, 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::ChunkProcessingFailed)
        ));
    }

    #[tokio::test]
    async fn embedder_failures_still_drain_all_results() {
        let (_dir, pool) = test_pool().await;
        let document_id = seed_document(&pool).await;

        let engine = ProcessingEngine::new();
        let embedder = Arc::new(StaticEmbedder {
            fail: true,
            ..StaticEmbedder::new("flaky-model", 768)
        });

        let chunks: Vec<Chunk> = (0..5).map(|i| body_chunk(&format!("chunk {i}"))).collect();
        let err = engine
            .process_chunks(chunks, &document_id, embedder.clone(), &pool, 2)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::ChunkProcessingFailed)
        ));
        // Every dispatched chunk was attempted before the aggregate
        // failure surfaced.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 5);

        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(chunk_count, 0);
    }
}
