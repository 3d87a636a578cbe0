//! Core data models shared across the ingestion pipeline.
//!
//! These types mirror the nine persisted tables. The data lifecycle is:
//!
//! ```text
//! URL → Importer → (Source, Download) → Transformer → (Document, DocumentMeta)
//!                                                          ↓
//!                                                     Chunker → Chunk
//!                                                          ↓
//!                                                     Embedder → Embedding
//! ```
//!
//! Ownership follows the lineage: a [`Source`] owns its [`Download`]s, a
//! download owns its [`Document`], a document owns its [`Chunk`]s and
//! [`DocumentMeta`] rows, and a chunk owns its [`Embedding`]. Nullable
//! columns are `Option<T>` so absence is checked at every use site.
//!
//! Timestamps are stored as RFC3339 text with second precision; ids are
//! UUID v4 strings.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Render a timestamp in the storage format: RFC3339 with second
/// precision (`2024-05-01T12:00:00Z`).
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored timestamp. Accepts RFC3339 (the creation format) and
/// SQLite's `datetime('now')` form (`YYYY-MM-DD HH:MM:SS`, written by
/// updates).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// The logical origin of a piece of content.
///
/// One source row is written per imported item (one per repository file,
/// one per WordPress post). The URL is stored both raw and decomposed so
/// downstream consumers can filter by host or path without re-parsing.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    /// UUID v4 primary key.
    pub id: String,
    /// Author email, when the provider exposes one.
    pub author_email: Option<String>,
    /// The original URL as imported.
    pub raw_url: Option<String>,
    /// URL scheme (`https`).
    pub scheme: Option<String>,
    /// URL host (`github.com`, `blog.example.com`).
    pub host: Option<String>,
    /// URL path component.
    pub path: Option<String>,
    /// URL query string, without the leading `?`.
    pub query: Option<String>,
    /// Whether the domain is active; the store constrains this to 0 or 1.
    pub active_domain: i64,
    /// Payload format tag: `json`, `yaml`, or `yml`.
    pub format: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One retrieval attempt for a [`Source`].
///
/// The store keeps at most three downloads per source; an insert trigger
/// evicts the oldest by `downloaded_at`, transparently to the engine.
#[derive(Debug, Clone, Serialize)]
pub struct Download {
    pub id: String,
    pub source_id: String,
    pub attempted_at: Option<DateTime<Utc>>,
    pub downloaded_at: Option<DateTime<Utc>>,
    /// HTTP status of the retrieval, when one was made.
    pub status_code: Option<i64>,
    /// Response headers serialized as a JSON mapping of name → list of values.
    pub headers: String,
    /// Opaque body payload. Repository blobs may arrive base64-encoded and
    /// are stored as-is; transformers decode on demand.
    pub body: Option<String>,
}

/// The structured interpretation of one [`Download`].
///
/// Exactly one document is written per successful transform. The chunk
/// size bounds are informational byte bounds recorded at transform time.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub source_id: String,
    pub download_id: String,
    /// Normalized format tag (`json`, `yaml`, `yml`, or `md`).
    pub format: Option<String>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub min_chunk_size: i64,
    pub max_chunk_size: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    /// Version tag of the producing system, when the payload carries one.
    pub producer_version: Option<String>,
}

/// Key→value property attached to a [`Document`].
///
/// `(document_id, key)` is unique; re-inserting a key upserts the value
/// and touches `created_at`.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentMeta {
    pub id: String,
    pub document_id: String,
    pub key: String,
    /// JSON-serialized value.
    pub meta: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A label that can be attached to documents.
#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Join row binding a [`Tag`] to a [`Document`]; `(document_id, tag_id)`
/// is unique.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentTag {
    pub id: String,
    pub document_id: String,
    pub tag_id: String,
    pub created_at: DateTime<Utc>,
}

/// A contiguous slice of a document's normalized content.
///
/// Chunks form a flat doubly-linked sibling list through `left_chunk_id` /
/// `right_chunk_id`: the first chunk has no left, the last has no right,
/// and each adjacent pair points at each other. The links are plain id
/// references resolved through the store — commit order across workers
/// does not affect them. `parent_chunk_id` is reserved for hierarchical
/// strategies and stays absent under token chunking.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub parent_chunk_id: Option<String>,
    pub left_chunk_id: Option<String>,
    pub right_chunk_id: Option<String>,
    pub body: Option<String>,
    /// UTF-8 byte length of `body`.
    pub byte_size: Option<i64>,
    /// Name of the encoding that produced `token_count`.
    pub tokenizer: Option<String>,
    pub token_count: Option<i64>,
    /// Natural language tag; the store constrains this to `en` or `fr`.
    pub natural_lang: Option<String>,
    /// Code language tag; the store constrains this to `python`, `sql`,
    /// or `javascript`.
    pub code_lang: Option<String>,
}

impl Chunk {
    /// An empty chunk carrying only its id; producers fill in the rest.
    pub fn new(id: String) -> Self {
        Self {
            id,
            document_id: String::new(),
            parent_chunk_id: None,
            left_chunk_id: None,
            right_chunk_id: None,
            body: None,
            byte_size: None,
            tokenizer: None,
            token_count: None,
            natural_lang: None,
            code_lang: None,
        }
    }
}

/// A fixed-dimension vector in one of the three supported widths.
///
/// Exactly one variant is ever stored; the variant selects the embedding
/// column, so a vector of the wrong width for its column cannot be
/// represented.
#[derive(Debug, Clone, Serialize)]
pub enum EmbeddingVector {
    Dim768(Vec<f32>),
    Dim1536(Vec<f32>),
    Dim3072(Vec<f32>),
}

impl EmbeddingVector {
    /// Wrap a raw vector according to its declared dimension. Returns
    /// `None` for dimensions outside {768, 1536, 3072}.
    pub fn from_dimension(dimension: usize, values: Vec<f32>) -> Option<Self> {
        match dimension {
            768 => Some(Self::Dim768(values)),
            1536 => Some(Self::Dim1536(values)),
            3072 => Some(Self::Dim3072(values)),
            _ => None,
        }
    }

    /// The embeddings table column this vector belongs in.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Dim768(_) => "embedding_768",
            Self::Dim1536(_) => "embedding_1536",
            Self::Dim3072(_) => "embedding_3072",
        }
    }

    pub fn values(&self) -> &[f32] {
        match self {
            Self::Dim768(v) | Self::Dim1536(v) | Self::Dim3072(v) => v,
        }
    }

    /// Serialize as the `[v0, v1, …]` text form the store expects.
    pub fn to_column_text(&self) -> String {
        let rendered: Vec<String> = self.values().iter().map(|v| v.to_string()).collect();
        format!("[{}]", rendered.join(", "))
    }
}

/// A vector embedding bound to exactly one [`Chunk`].
#[derive(Debug, Clone, Serialize)]
pub struct Embedding {
    pub id: String,
    pub vector: EmbeddingVector,
    /// Model tag that produced the vector.
    pub model: Option<String>,
    pub embedded_at: DateTime<Utc>,
    /// Id of the embedded object — the chunk id.
    pub object_id: String,
    /// Kind of the embedded object; always `"chunk"` in this pipeline.
    pub object_type: String,
}

/// A logged retrieval request. Reserved for downstream search tooling;
/// nothing in the ingestion path writes these.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: String,
    pub message: String,
    pub meta: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub result_chunks: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_vector_rejects_unknown_dimension() {
        assert!(EmbeddingVector::from_dimension(999, vec![0.0; 999]).is_none());
        assert!(EmbeddingVector::from_dimension(0, Vec::new()).is_none());
    }

    #[test]
    fn embedding_vector_selects_column_by_width() {
        let v = EmbeddingVector::from_dimension(768, vec![0.0; 768]).unwrap();
        assert_eq!(v.column(), "embedding_768");
        let v = EmbeddingVector::from_dimension(1536, vec![0.0; 1536]).unwrap();
        assert_eq!(v.column(), "embedding_1536");
        let v = EmbeddingVector::from_dimension(3072, vec![0.0; 3072]).unwrap();
        assert_eq!(v.column(), "embedding_3072");
    }

    #[test]
    fn embedding_vector_column_text() {
        let v = EmbeddingVector::Dim768(vec![0.5, -1.0, 2.0]);
        assert_eq!(v.to_column_text(), "[0.5, -1, 2]");
    }

    #[test]
    fn timestamps_round_trip_in_both_stored_formats() {
        let now = chrono::Utc::now();
        let rendered = format_timestamp(&now);
        let parsed = parse_timestamp(&rendered).unwrap();
        assert_eq!(parsed.timestamp(), now.timestamp());

        let sqlite_form = parse_timestamp("2024-05-01 12:30:45").unwrap();
        assert_eq!(format_timestamp(&sqlite_form), "2024-05-01T12:30:45Z");

        assert!(parse_timestamp("not a timestamp").is_none());
    }
}
