//! Source rows: create, get, list, delete.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::RepositoryError;
use crate::models::{format_timestamp, parse_timestamp, Source};

fn source_from_row(row: &SqliteRow) -> Result<Source> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Source {
        id: row.try_get("id")?,
        author_email: row.try_get("author_email")?,
        raw_url: row.try_get("raw_url")?,
        scheme: row.try_get("scheme")?,
        host: row.try_get("host")?,
        path: row.try_get("path")?,
        query: row.try_get("query")?,
        active_domain: row.try_get("active_domain")?,
        format: row.try_get("format")?,
        created_at: parse_timestamp(&created_at)
            .ok_or_else(|| anyhow::anyhow!("unsupported timestamp format: {created_at}"))?,
        updated_at: parse_timestamp(&updated_at)
            .ok_or_else(|| anyhow::anyhow!("unsupported timestamp format: {updated_at}"))?,
    })
}

const SOURCE_COLUMNS: &str =
    "id, author_email, raw_url, scheme, host, path, query, active_domain, format, created_at, updated_at";

pub async fn create_source(pool: &SqlitePool, source: &Source) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sources (id, author_email, raw_url, scheme, host, path,
                             query, active_domain, format, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&source.id)
    .bind(&source.author_email)
    .bind(&source.raw_url)
    .bind(&source.scheme)
    .bind(&source.host)
    .bind(&source.path)
    .bind(&source.query)
    .bind(source.active_domain)
    .bind(&source.format)
    .bind(format_timestamp(&source.created_at))
    .bind(format_timestamp(&source.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_source(pool: &SqlitePool, id: &str) -> Result<Source> {
    let query = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?");
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| RepositoryError::SourceNotFound(id.to_string()))?;

    source_from_row(&row)
}

pub async fn list_sources(pool: &SqlitePool) -> Result<Vec<Source>> {
    let query = format!("SELECT {SOURCE_COLUMNS} FROM sources ORDER BY created_at DESC");
    let rows = sqlx::query(&query).fetch_all(pool).await?;

    rows.iter().map(source_from_row).collect()
}

pub async fn delete_source(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM sources WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}
