//! Source importers.
//!
//! An importer enumerates the items behind a URL, fetches each one, and
//! persists a source + download row pair per item. Two importers ship:
//!
//! - [`GitHubImporter`] ("github") — crawls a repository tree via the
//!   hosting provider's API.
//! - [`WpJsonImporter`] ("wp-json") — pages through a WordPress JSON API
//!   collection.
//!
//! Importers that process many items collect per-item failures and keep
//! going; the returned [`crate::traits::ImportResult`] carries the last
//! successful pair, with [`ImporterError::ImportCompleted`] attached when
//! anything failed along the way.

mod github;
mod wpjson;

pub use github::GitHubImporter;
pub use wpjson::WpJsonImporter;

use anyhow::Result;
use sqlx::SqlitePool;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::models::format_timestamp;

#[derive(Debug, Error)]
pub enum ImporterError {
    #[error("not a GitHub URL")]
    NotGitHubUrl,
    #[error("invalid GitHub URL format")]
    InvalidGitHubUrlFormat,
    #[error("invalid GitHub URL: missing owner or repository")]
    InvalidGitHubUrl,
    #[error("GitHub API request failed with status {0}")]
    GitHubApiRequestFailed(u16),
    #[error("no files were successfully imported")]
    NoFilesImported,
    #[error("not a WordPress JSON API endpoint")]
    NotWordPressApi,
    #[error("unexpected status code {0}")]
    UnexpectedStatusCode(u16),
    #[error("unexpected status code {0} for post")]
    UnexpectedPostStatusCode(u16),
    #[error("no posts were successfully imported")]
    NoPostsImported,
    /// Partial-success marker: some items failed but at least one source +
    /// download pair was persisted.
    #[error("import completed with errors")]
    ImportCompleted,
}

/// Insert a source row for `raw_url`, decomposed into its parts.
/// Returns the new source id.
pub(crate) async fn insert_source(pool: &SqlitePool, raw_url: &str, format: &str) -> Result<String> {
    let parsed = Url::parse(raw_url)?;
    let source_id = Uuid::new_v4().to_string();
    let now = format_timestamp(&chrono::Utc::now());

    sqlx::query(
        r#"
        INSERT INTO sources (id, raw_url, scheme, host, path, query, active_domain, format, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&source_id)
    .bind(raw_url)
    .bind(parsed.scheme())
    .bind(parsed.host_str())
    .bind(parsed.path())
    .bind(parsed.query())
    .bind(1_i64)
    .bind(format)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(source_id)
}

/// Insert a download row for `source_id`. `headers_json` is the serialized
/// name → list-of-values mapping. Returns the new download id.
pub(crate) async fn insert_download(
    pool: &SqlitePool,
    source_id: &str,
    status_code: i64,
    headers_json: &str,
    body: &str,
) -> Result<String> {
    let download_id = Uuid::new_v4().to_string();
    let now = format_timestamp(&chrono::Utc::now());

    sqlx::query(
        r#"
        INSERT INTO downloads (id, source_id, attempted_at, downloaded_at, status_code, headers, body)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&download_id)
    .bind(source_id)
    .bind(&now)
    .bind(&now)
    .bind(status_code)
    .bind(headers_json)
    .bind(body)
    .execute(pool)
    .await?;

    Ok(download_id)
}

/// Serialize a response header map into the stored JSON shape.
pub(crate) fn headers_to_json(headers: &reqwest::header::HeaderMap) -> String {
    let mut map: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
    for (name, value) in headers {
        map.entry(name.as_str().to_string())
            .or_default()
            .push(value.to_str().unwrap_or_default().to_string());
    }
    serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
}
