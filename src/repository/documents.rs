//! Document rows: list and get for the CLI surface.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::RepositoryError;
use crate::models::{parse_timestamp, Document};

const DOCUMENT_COLUMNS: &str = "id, source_id, download_id, format, indexed_at, min_chunk_size, \
                                max_chunk_size, published_at, modified_at, producer_version";

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let indexed_at: Option<String> = row.try_get("indexed_at")?;
    let published_at: Option<String> = row.try_get("published_at")?;
    let modified_at: Option<String> = row.try_get("modified_at")?;

    Ok(Document {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        download_id: row.try_get("download_id")?,
        format: row.try_get("format")?,
        indexed_at: indexed_at.as_deref().and_then(parse_timestamp),
        min_chunk_size: row.try_get("min_chunk_size")?,
        max_chunk_size: row.try_get("max_chunk_size")?,
        published_at: published_at.as_deref().and_then(parse_timestamp),
        modified_at: modified_at.as_deref().and_then(parse_timestamp),
        producer_version: row.try_get("producer_version")?,
    })
}

pub async fn get_document(pool: &SqlitePool, id: &str) -> Result<Document> {
    let query = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?");
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| RepositoryError::DocumentNotFound(id.to_string()))?;

    document_from_row(&row)
}

pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<Document>> {
    let query = format!("SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY indexed_at DESC");
    let rows = sqlx::query(&query).fetch_all(pool).await?;

    rows.iter().map(document_from_row).collect()
}
