//! Row-level access to stored entities.
//!
//! Thin query functions over the pool: CRUD listing for the CLI surface
//! plus the lookups the engine needs to resume a pipeline from a stored
//! download. All timestamp columns are stored as text and parsed through
//! [`crate::models::parse_timestamp`].

pub mod documents;
pub mod downloads;
pub mod sources;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("source not found: {0}")]
    SourceNotFound(String),
    #[error("download not found: {0}")]
    DownloadNotFound(String),
    #[error("document not found: {0}")]
    DocumentNotFound(String),
}
