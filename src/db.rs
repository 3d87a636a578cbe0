//! Store connection factory.
//!
//! The pool is opened from `TURSO_DATABASE_URL` before the engine is
//! invoked and shared across workers; the engine does not own its
//! lifecycle. For remote-schemed URLs (`libsql://`, `wss://`) the
//! companion `TURSO_AUTH_TOKEN` must be present; the embedded driver
//! connects to `sqlite:` URLs and plain paths directly.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("TURSO_DATABASE_URL environment variable is required")]
    DatabaseUrlRequired,
    #[error("TURSO_AUTH_TOKEN environment variable is required")]
    AuthTokenRequired,
}

/// Open the shared connection pool from environment credentials.
pub async fn connect() -> Result<SqlitePool> {
    let db_url = std::env::var("TURSO_DATABASE_URL").unwrap_or_default();
    if db_url.is_empty() {
        return Err(DbError::DatabaseUrlRequired.into());
    }

    if is_remote_url(&db_url) {
        let token = std::env::var("TURSO_AUTH_TOKEN").unwrap_or_default();
        if token.is_empty() {
            return Err(DbError::AuthTokenRequired.into());
        }
    }

    connect_to(&db_url).await
}

/// Open a pool against an explicit URL or filesystem path.
pub async fn connect_to(db_url: &str) -> Result<SqlitePool> {
    let connect_str = if db_url.contains(':') {
        db_url.to_string()
    } else {
        format!("sqlite:{db_url}")
    };

    let options = SqliteConnectOptions::from_str(&connect_str)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

fn is_remote_url(url: &str) -> bool {
    url.starts_with("libsql://") || url.starts_with("wss://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_urls_detected() {
        assert!(is_remote_url("libsql://db.example.turso.io"));
        assert!(is_remote_url("wss://db.example.turso.io"));
        assert!(!is_remote_url("sqlite:./data/quarry.db"));
        assert!(!is_remote_url("./data/quarry.db"));
    }
}
