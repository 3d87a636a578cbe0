//! Download transformers.
//!
//! A transformer reads a download, normalizes its payload into markdown,
//! and writes the document + metadata rows. The normalized content it
//! returns is what flows to the chunker. Two transformers ship:
//!
//! - [`GitHubTransformer`] ("github") — repository file payloads, keyed on
//!   the `X-GitHub-SHA` download header.
//! - [`WpJsonTransformer`] ("wp-json") — WordPress post JSON payloads.
//!
//! Document rows default to `min_chunk_size` 212 and `max_chunk_size`
//! 8191 bytes, with `indexed_at` set at transform time.

mod github;
mod wpjson;

pub use github::GitHubTransformer;
pub use wpjson::WpJsonTransformer;

use anyhow::Result;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{format_timestamp, Document};

pub(crate) const MIN_CHUNK_SIZE: i64 = 212;
/// Matches the input budget of the default embedding models.
pub(crate) const MAX_CHUNK_SIZE: i64 = 8191;

#[derive(Debug, Error)]
pub enum TransformerError {
    #[error("cannot transform this download, it is not a valid repository file")]
    CannotTransformDownload,
    #[error("cannot transform this download, it is not a valid WordPress JSON response")]
    CannotTransformWpDownload,
    #[error("no content field found")]
    NoContentField,
    #[error("content field is not an object")]
    ContentFieldNotObject,
    #[error("no rendered content found")]
    NoRenderedContent,
    #[error("rendered content is not a string")]
    RenderedContentNotString,
}

/// Convert HTML to markdown, passing the original through when the
/// converter fails.
pub(crate) fn html_to_markdown_lossy(html: &str) -> String {
    htmd::convert(html).unwrap_or_else(|_| html.to_string())
}

/// Natural-language hint: counts occurrences of a fixed set of French
/// function words; three or more hits reports `fr`, anything else `en`.
/// Short, mixed, or non-Latin content will be mislabeled — treat the
/// result as a hint, not a contract.
pub(crate) fn detect_natural_language(content: &str) -> &'static str {
    const FRENCH_INDICATORS: &[&str] = &[
        "le ", "la ", "les ", "et ", "dans ", "avec ", "pour ", "par ", "sur ", "de ", "du ",
        "des ", "au ", "aux ", "que ", "qui ", "où ",
    ];

    let lowered = content.to_lowercase();
    let hits = FRENCH_INDICATORS
        .iter()
        .filter(|indicator| lowered.contains(*indicator))
        .count();

    if hits >= 3 {
        "fr"
    } else {
        "en"
    }
}

/// Insert the document row.
pub(crate) async fn save_document(pool: &SqlitePool, document: &Document) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (id, source_id, download_id, format, indexed_at,
                               min_chunk_size, max_chunk_size, published_at, modified_at, producer_version)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&document.id)
    .bind(&document.source_id)
    .bind(&document.download_id)
    .bind(&document.format)
    .bind(document.indexed_at.as_ref().map(format_timestamp))
    .bind(document.min_chunk_size)
    .bind(document.max_chunk_size)
    .bind(document.published_at.as_ref().map(format_timestamp))
    .bind(document.modified_at.as_ref().map(format_timestamp))
    .bind(&document.producer_version)
    .execute(pool)
    .await?;

    Ok(())
}

/// Upsert every metadata key for `document_id`. Values are stored as
/// serialized JSON; re-inserting a key replaces the value and touches
/// `created_at`.
pub(crate) async fn save_metadata(
    pool: &SqlitePool,
    document_id: &str,
    metadata: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    for (key, value) in metadata {
        let meta_json = serde_json::to_string(value)?;
        sqlx::query(
            r#"
            INSERT INTO document_meta (id, document_id, key, meta, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(document_id, key) DO UPDATE SET
                meta = excluded.meta,
                created_at = excluded.created_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(document_id)
        .bind(key)
        .bind(&meta_json)
        .bind(format_timestamp(&chrono::Utc::now()))
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn french_content_is_detected() {
        let content = "Le chat est dans la maison avec les enfants pour la journée.";
        assert_eq!(detect_natural_language(content), "fr");
    }

    #[test]
    fn english_content_is_the_default() {
        assert_eq!(
            detect_natural_language("The quick brown fox jumps over the fence."),
            "en"
        );
        assert_eq!(detect_natural_language(""), "en");
    }

    #[test]
    fn two_indicators_are_not_enough() {
        // "le " and "de " only.
        assert_eq!(detect_natural_language("le train de nuit"), "en");
    }

    #[test]
    fn html_conversion_produces_markdown() {
        let markdown = html_to_markdown_lossy("<h1>Title</h1><p>Body text</p>");
        assert!(markdown.contains("# Title"));
        assert!(markdown.contains("Body text"));
    }
}
