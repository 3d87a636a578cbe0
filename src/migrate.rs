//! Database schema migrations.
//!
//! Creates the nine tables, their indexes, and the download-retention
//! trigger. All statements are `IF NOT EXISTS`, so running the migration
//! repeatedly is safe.
//!
//! # Schema
//!
//! ```text
//! sources ──< downloads ──< documents ──< chunks ──< embeddings
//!                               │
//!                               ├──< document_meta   (unique document_id, key)
//!                               └──< document_tags >── tags
//! requests                                           (standalone)
//! ```
//!
//! Store-enforced invariants:
//!
//! - `sources.active_domain` ∈ {0, 1}
//! - `sources.format` ∈ {json, yml, yaml}; `documents.format` additionally
//!   admits `md` (written by the paginated-JSON transformer)
//! - `chunks.natural_lang` ∈ {en, fr}; `chunks.code_lang` ∈ {python, sql,
//!   javascript}
//! - at most 3 downloads per source: an AFTER INSERT trigger deletes the
//!   oldest rows by `downloaded_at` beyond the three most recent
//! - chunk sibling links (`left_chunk_id` / `right_chunk_id`) carry no
//!   foreign keys; workers commit chunks out of order, so a link may
//!   briefly point at a row that lands later in the same run

use anyhow::Result;
use sqlx::SqlitePool;

/// Run all migrations against the pool. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            author_email TEXT,
            raw_url TEXT,
            scheme TEXT,
            host TEXT,
            path TEXT,
            query TEXT,
            active_domain INTEGER NOT NULL DEFAULT 1 CHECK (active_domain IN (0, 1)),
            format TEXT CHECK (format IN ('json', 'yml', 'yaml')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS downloads (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            attempted_at TEXT,
            downloaded_at TEXT,
            status_code INTEGER,
            headers TEXT NOT NULL DEFAULT '{}',
            body TEXT,
            FOREIGN KEY (source_id) REFERENCES sources(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            download_id TEXT NOT NULL,
            format TEXT CHECK (format IN ('json', 'yml', 'yaml', 'md')),
            indexed_at TEXT,
            min_chunk_size INTEGER NOT NULL,
            max_chunk_size INTEGER NOT NULL,
            published_at TEXT,
            modified_at TEXT,
            producer_version TEXT,
            FOREIGN KEY (source_id) REFERENCES sources(id) ON DELETE CASCADE,
            FOREIGN KEY (download_id) REFERENCES downloads(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_meta (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            key TEXT NOT NULL,
            meta TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (document_id, key),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_tags (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            tag_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (document_id, tag_id),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            parent_chunk_id TEXT,
            left_chunk_id TEXT,
            right_chunk_id TEXT,
            body TEXT,
            byte_size INTEGER,
            tokenizer TEXT,
            token_count INTEGER,
            natural_lang TEXT CHECK (natural_lang IN ('en', 'fr')),
            code_lang TEXT CHECK (code_lang IN ('python', 'sql', 'javascript')),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            id TEXT PRIMARY KEY,
            embedding_768 TEXT,
            embedding_1536 TEXT,
            embedding_3072 TEXT,
            model TEXT,
            embedded_at TEXT NOT NULL,
            object_id TEXT NOT NULL,
            object_type TEXT NOT NULL DEFAULT 'chunk'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS requests (
            id TEXT PRIMARY KEY,
            message TEXT NOT NULL,
            meta TEXT,
            requested_at TEXT NOT NULL,
            result_chunks TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Retain only the three most recent downloads per source.
    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS downloads_retention AFTER INSERT ON downloads
        BEGIN
            DELETE FROM downloads
            WHERE source_id = NEW.source_id
              AND id NOT IN (
                  SELECT id FROM downloads
                  WHERE source_id = NEW.source_id
                  ORDER BY downloaded_at DESC
                  LIMIT 3
              );
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_downloads_source_id ON downloads(source_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source_id ON documents(source_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_download_id ON documents(download_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_document_meta_document_id ON document_meta(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_embeddings_object_id ON embeddings(object_id)")
        .execute(pool)
        .await?;

    Ok(())
}
