//! # Quarry CLI (`quarry`)
//!
//! Command-line front-end for the ingestion pipeline.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quarry migrate` | Create the schema in the configured store |
//! | `quarry import --url <U>` | Import a URL, then transform, chunk, and embed it |
//! | `quarry transform --download-id <ID>` | Re-run transform/chunk/embed for a stored download |
//! | `quarry sources list\|get\|create\|delete` | CRUD over source rows |
//! | `quarry documents list\|get` | List and fetch document rows |
//!
//! Configuration comes from the environment (a `.env` file is loaded when
//! present). `TURSO_DATABASE_URL` selects the store; embedding credentials
//! come from `OPENAI_API_KEY` / `TOGETHER_API_KEY`.
//!
//! ```bash
//! # Import a WordPress knowledge base
//! quarry import --url "https://wsform.com/wp-json/wp/v2/knowledgebase"
//!
//! # Import a repository with custom settings
//! quarry import --url "https://github.com/owner/repo" \
//!     --model text-embedding-3-small --tokens 4096 --concurrency 10
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use quarry::chunkers::TokenChunker;
use quarry::embedders::{OpenAiEmbedder, TogetherAiEmbedder};
use quarry::importers::{GitHubImporter, WpJsonImporter};
use quarry::models::Source;
use quarry::repository::{documents, sources};
use quarry::transformers::{GitHubTransformer, WpJsonTransformer};
use quarry::{db, logging, migrate, ProcessingEngine, ProcessingOptions};

const OPENAI_MODELS: &[&str] = &[
    "text-embedding-3-small",
    "text-embedding-3-large",
    "text-embedding-ada-002",
];
const TOGETHER_MODELS: &[&str] = &[
    "togethercomputer/m2-bert-80M-8k-retrieval",
    "togethercomputer/m2-bert-80M-32k-retrieval",
];

/// Quarry — ingest web content into chunked, embedded documents.
#[derive(Parser)]
#[command(
    name = "quarry",
    about = "Ingest web content into chunked, embedded documents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations against the configured store.
    Migrate,

    /// Import content from an external source and process it end to end.
    Import {
        /// Source URL to import from.
        #[arg(short, long)]
        url: String,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Transform an existing download into a document, chunks, and
    /// embeddings.
    Transform {
        /// Download id to transform.
        #[arg(short, long)]
        download_id: String,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Manage source rows.
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Inspect document rows.
    Documents {
        #[command(subcommand)]
        action: DocumentsAction,
    },
}

/// Shared pipeline tuning flags for `import` and `transform`.
#[derive(clap::Args)]
struct PipelineArgs {
    /// Embedding model to use.
    #[arg(short, long, default_value = "text-embedding-3-small")]
    model: String,

    /// Chunking strategy.
    #[arg(short, long, default_value = "token")]
    strategy: String,

    /// Maximum tokens per chunk.
    #[arg(short, long, default_value_t = 8191)]
    tokens: usize,

    /// Number of concurrent chunk workers (must be at least 1).
    #[arg(short, long, default_value_t = 5)]
    concurrency: usize,

    /// Overall timeout in seconds.
    #[arg(long, default_value_t = 300)]
    timeout: u64,
}

#[derive(Subcommand)]
enum SourcesAction {
    /// List all sources.
    List,
    /// Get a source by id.
    Get { id: String },
    /// Create a source row.
    Create {
        /// Source id; generated when omitted.
        #[arg(long)]
        id: Option<String>,
        /// Raw URL.
        #[arg(long)]
        url: String,
        #[arg(long)]
        author_email: Option<String>,
        /// Active domain flag (0 or 1).
        #[arg(long, default_value_t = 1)]
        active_domain: i64,
        /// Format tag (json, yml, yaml).
        #[arg(long)]
        format: Option<String>,
    },
    /// Delete a source by id.
    Delete { id: String },
}

#[derive(Subcommand)]
enum DocumentsAction {
    /// List all documents.
    List,
    /// Get a document by id.
    Get { id: String },
}

impl PipelineArgs {
    fn to_options(&self) -> ProcessingOptions {
        ProcessingOptions {
            max_tokens: self.tokens,
            chunk_strategy: self.strategy.clone(),
            embedding_model: self.model.clone(),
            concurrency: self.concurrency.max(1),
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

/// Build an engine with every adapter the pipeline knows, choosing the
/// embedder family from the requested model name.
fn build_engine(model: &str, concurrency: usize) -> Result<ProcessingEngine> {
    let engine = ProcessingEngine::new();

    engine.register_importer(Arc::new(
        WpJsonImporter::new().with_concurrency(concurrency),
    ))?;
    engine.register_importer(Arc::new(GitHubImporter::new()))?;

    engine.register_transformer(Arc::new(WpJsonTransformer::new()))?;
    engine.register_transformer(Arc::new(GitHubTransformer::new()))?;

    engine.register_chunker(Arc::new(
        TokenChunker::from_env().context("failed to create token chunker")?,
    ))?;

    if OPENAI_MODELS.contains(&model) {
        engine.register_embedder(Arc::new(
            OpenAiEmbedder::new(model).context("failed to create OpenAI embedder")?,
        ))?;
    } else if TOGETHER_MODELS.contains(&model) {
        engine.register_embedder(Arc::new(
            TogetherAiEmbedder::new(model).context("failed to create Together embedder")?,
        ))?;
    } else {
        anyhow::bail!("unsupported embedding model: {model}");
    }

    Ok(engine)
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the real environment still applies.
    let _ = dotenvy::dotenv();
    logging::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate => {
            let pool = db::connect().await?;
            migrate::run_migrations(&pool).await?;
            println!("Database migration completed successfully.");
        }

        Commands::Import { url, pipeline } => {
            let options = pipeline.to_options();
            let engine = build_engine(&pipeline.model, options.concurrency)?;
            let pool = db::connect().await?;

            tokio::time::timeout(options.timeout, engine.process_source(&url, &options, &pool))
                .await
                .context("import timed out")??;
            println!("Import completed successfully.");
        }

        Commands::Transform {
            download_id,
            pipeline,
        } => {
            let options = pipeline.to_options();
            let engine = build_engine(&pipeline.model, options.concurrency)?;
            let pool = db::connect().await?;

            tokio::time::timeout(
                options.timeout,
                engine.process_document(&download_id, &options, &pool),
            )
            .await
            .context("transformation timed out")??;
            println!("Transformation completed successfully.");
        }

        Commands::Sources { action } => {
            let pool = db::connect().await?;
            match action {
                SourcesAction::List => {
                    let rows = sources::list_sources(&pool).await?;
                    if rows.is_empty() {
                        println!("No sources found.");
                    } else {
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    }
                }
                SourcesAction::Get { id } => {
                    let source = sources::get_source(&pool, &id).await?;
                    println!("{}", serde_json::to_string_pretty(&source)?);
                }
                SourcesAction::Create {
                    id,
                    url,
                    author_email,
                    active_domain,
                    format,
                } => {
                    let now = chrono::Utc::now();
                    let source = Source {
                        id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                        author_email,
                        raw_url: Some(url),
                        scheme: None,
                        host: None,
                        path: None,
                        query: None,
                        active_domain,
                        format,
                        created_at: now,
                        updated_at: now,
                    };
                    sources::create_source(&pool, &source).await?;
                    println!("Source created successfully with id: {}", source.id);
                }
                SourcesAction::Delete { id } => {
                    sources::delete_source(&pool, &id).await?;
                    println!("Source deleted successfully: {id}");
                }
            }
        }

        Commands::Documents { action } => {
            let pool = db::connect().await?;
            match action {
                DocumentsAction::List => {
                    let rows = documents::list_documents(&pool).await?;
                    if rows.is_empty() {
                        println!("No documents found.");
                    } else {
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    }
                }
                DocumentsAction::Get { id } => {
                    let document = documents::get_document(&pool, &id).await?;
                    println!("{}", serde_json::to_string_pretty(&document)?);
                }
            }
        }
    }

    Ok(())
}
