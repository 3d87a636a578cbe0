//! Download rows: the lookup the engine needs to resume from a stored
//! download id.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use super::RepositoryError;
use crate::models::{parse_timestamp, Download};

pub async fn get_download(pool: &SqlitePool, id: &str) -> Result<Download> {
    let row = sqlx::query(
        "SELECT id, source_id, attempted_at, downloaded_at, status_code, headers, body
         FROM downloads WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| RepositoryError::DownloadNotFound(id.to_string()))?;

    let attempted_at: Option<String> = row.try_get("attempted_at")?;
    let downloaded_at: Option<String> = row.try_get("downloaded_at")?;

    Ok(Download {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        attempted_at: attempted_at.as_deref().and_then(parse_timestamp),
        downloaded_at: downloaded_at.as_deref().and_then(parse_timestamp),
        status_code: row.try_get("status_code")?,
        headers: row.try_get("headers")?,
        body: row.try_get("body")?,
    })
}
