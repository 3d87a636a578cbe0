//! Paginated-JSON item transformer.
//!
//! Interprets a WordPress post payload: pulls `content.rendered` out of
//! the JSON, converts the HTML to markdown, parses the GMT date pair into
//! document timestamps, and writes the document plus post metadata rows.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use super::{
    detect_natural_language, save_document, save_metadata, TransformerError, MAX_CHUNK_SIZE,
    MIN_CHUNK_SIZE,
};
use crate::models::{Document, Download};
use crate::traits::{TransformResult, Transformer};

/// Zone-less timestamp format used by the provider's `*_gmt` fields.
const WP_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Transformer for WordPress post downloads ("wp-json").
pub struct WpJsonTransformer {
    link_pattern: Regex,
}

impl WpJsonTransformer {
    pub fn new() -> Self {
        Self {
            link_pattern: Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("link pattern"),
        }
    }

    /// Pull `content.rendered` out of the payload and convert it to
    /// markdown. Each containment probe has its own failure kind.
    fn extract_content(&self, post: &serde_json::Value) -> Result<String> {
        let content = post
            .get("content")
            .ok_or(TransformerError::NoContentField)?;
        let content_map = content
            .as_object()
            .ok_or(TransformerError::ContentFieldNotObject)?;
        let rendered = content_map
            .get("rendered")
            .ok_or(TransformerError::NoRenderedContent)?;
        let html = rendered
            .as_str()
            .ok_or(TransformerError::RenderedContentNotString)?;

        htmd::convert(html).map_err(|e| anyhow::anyhow!("failed to convert HTML to markdown: {e}"))
    }

    /// Build the document row, parsing the GMT date pair. A date that
    /// fails to parse aborts the transform.
    fn extract_document(
        &self,
        post: &serde_json::Value,
        download: &Download,
    ) -> Result<Document> {
        let mut document = Document {
            id: Uuid::new_v4().to_string(),
            source_id: download.source_id.clone(),
            download_id: download.id.clone(),
            format: Some("md".to_string()),
            indexed_at: Some(chrono::Utc::now()),
            min_chunk_size: MIN_CHUNK_SIZE,
            max_chunk_size: MAX_CHUNK_SIZE,
            published_at: None,
            modified_at: None,
            producer_version: None,
        };

        if let Some(date_gmt) = post.get("date_gmt").and_then(|v| v.as_str()) {
            let parsed = NaiveDateTime::parse_from_str(date_gmt, WP_DATE_FORMAT)?;
            document.published_at = Some(parsed.and_utc());
        }

        if let Some(modified_gmt) = post.get("modified_gmt").and_then(|v| v.as_str()) {
            let parsed = NaiveDateTime::parse_from_str(modified_gmt, WP_DATE_FORMAT)?;
            document.modified_at = Some(parsed.and_utc());
        }

        Ok(document)
    }

    /// Post metadata; keys absent from the payload are omitted.
    fn extract_metadata(
        &self,
        post: &serde_json::Value,
        content: &str,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut metadata = serde_json::Map::new();

        if let Some(title) = rendered_field(post, "title") {
            if let Ok(markdown) = htmd::convert(&title) {
                metadata.insert("document_title".to_string(), markdown.trim().into());
            }
        }

        if let Some(excerpt) = rendered_field(post, "excerpt") {
            if let Ok(markdown) = htmd::convert(&excerpt) {
                metadata.insert("document_description".to_string(), markdown.trim().into());
            }
        }

        metadata.insert(
            "links_count".to_string(),
            self.link_pattern.find_iter(content).count().into(),
        );

        if let Some(link) = post.get("link").and_then(|v| v.as_str()) {
            metadata.insert("canonical_url".to_string(), link.into());
        }
        if let Some(author) = post.get("author").and_then(|v| v.as_i64()) {
            metadata.insert("author_id".to_string(), author.into());
        }
        if let Some(status) = post.get("status").and_then(|v| v.as_str()) {
            metadata.insert("status".to_string(), status.into());
        }
        if let Some(post_type) = post.get("type").and_then(|v| v.as_str()) {
            metadata.insert("post_type".to_string(), post_type.into());
        }
        if let Some(slug) = post.get("slug").and_then(|v| v.as_str()) {
            metadata.insert("slug".to_string(), slug.into());
        }
        if let Some(media) = post.get("featured_media").and_then(|v| v.as_i64()) {
            metadata.insert("featured_media".to_string(), media.into());
        }
        if let Some(categories) = post.get("categories").and_then(|v| v.as_array()) {
            metadata.insert("categories".to_string(), categories.clone().into());
        }
        if let Some(tags) = post.get("tags").and_then(|v| v.as_array()) {
            metadata.insert("tags".to_string(), tags.clone().into());
        }

        metadata
    }
}

impl Default for WpJsonTransformer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transformer for WpJsonTransformer {
    async fn transform(&self, download: &Download, pool: &SqlitePool) -> Result<TransformResult> {
        if !self.can_transform(download) {
            return Err(TransformerError::CannotTransformWpDownload.into());
        }

        info!(download_id = %download.id, "starting post transformation");

        let body = download.body.as_deref().unwrap_or_default();
        let post: serde_json::Value = serde_json::from_str(body)?;

        let content = self.extract_content(&post)?;
        let document = self.extract_document(&post, download)?;
        let language = detect_natural_language(&content).to_string();
        let metadata = self.extract_metadata(&post, &content);

        save_document(pool, &document).await?;
        save_metadata(pool, &document.id, &metadata).await?;

        info!(document_id = %document.id, "post transformation completed");

        Ok(TransformResult {
            document,
            content,
            language,
            metadata,
        })
    }

    fn source_type(&self) -> &'static str {
        "wp-json"
    }

    fn can_transform(&self, download: &Download) -> bool {
        let Some(body) = download.body.as_deref() else {
            return false;
        };
        let Ok(post) = serde_json::from_str::<serde_json::Value>(body) else {
            return false;
        };

        post.get("content").is_some()
            && post.get("title").is_some()
            && post.get("date_gmt").is_some()
            && post.get("modified_gmt").is_some()
    }
}

/// `post[field].rendered` as a string, when present.
fn rendered_field(post: &serde_json::Value, field: &str) -> Option<String> {
    post.get(field)?
        .as_object()?
        .get("rendered")?
        .as_str()
        .map(|s| s.to_string())
}
