//! Paginated-JSON importer for WordPress API collections.
//!
//! Enumeration is serial in page order; the provider signals "past the
//! last page" with a 400 status. Individual items are fetched in parallel
//! under a semaphore and persisted independently, so commit order across
//! items is unspecified.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use url::Url;

use super::{headers_to_json, insert_download, insert_source, ImporterError};
use crate::traits::{ImportResult, Importer};

const DEFAULT_PER_PAGE: usize = 100;
/// Safety bound on enumeration.
const DEFAULT_MAX_PAGES: usize = 1000;
const DEFAULT_CONCURRENCY: usize = 5;

/// Importer for WordPress JSON API endpoints ("wp-json").
pub struct WpJsonImporter {
    client: reqwest::Client,
    per_page: usize,
    max_pages: usize,
    concurrency: usize,
}

impl WpJsonImporter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("default reqwest client"),
            per_page: DEFAULT_PER_PAGE,
            max_pages: DEFAULT_MAX_PAGES,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        self
    }

    /// Enumerate item ids page by page. A 400 status or an empty page
    /// terminates enumeration; any other non-OK status is an error.
    pub(crate) async fn fetch_post_ids(&self, base_url: &str) -> Result<Vec<i64>> {
        let mut ids = Vec::new();

        for page in 1..=self.max_pages {
            let request_url = format!("{base_url}?page={page}&per_page={}", self.per_page);
            let response = self.client.get(&request_url).send().await?;
            let status = response.status();

            // The provider uses 400 to signal "past the last page".
            if status.as_u16() == 400 {
                break;
            }
            if !status.is_success() {
                return Err(ImporterError::UnexpectedStatusCode(status.as_u16()).into());
            }

            let posts: Vec<serde_json::Value> = response.json().await?;
            if posts.is_empty() {
                break;
            }

            for post in &posts {
                if let Some(id) = post.get("id").and_then(|v| v.as_i64()) {
                    ids.push(id);
                }
            }
        }

        Ok(ids)
    }

    /// Fetch and persist a single item.
    async fn import_post(
        client: &reqwest::Client,
        base_url: &str,
        post_id: i64,
        pool: &SqlitePool,
    ) -> Result<ImportResult> {
        let post_url = format!("{base_url}/{post_id}");

        let response = client.get(&post_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImporterError::UnexpectedPostStatusCode(status.as_u16()).into());
        }

        let headers_json = headers_to_json(response.headers());
        let post: serde_json::Value = response.json().await?;

        let source_id = insert_source(pool, &post_url, "json").await?;
        let download_id = insert_download(
            pool,
            &source_id,
            i64::from(status.as_u16()),
            &headers_json,
            &post.to_string(),
        )
        .await?;

        Ok(ImportResult {
            source_id,
            download_id,
            error: None,
        })
    }
}

impl Default for WpJsonImporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Importer for WpJsonImporter {
    async fn import(&self, source_url: &str, pool: &SqlitePool) -> Result<ImportResult> {
        self.validate_source(source_url)?;

        info!(source_url, "starting paginated import");

        let post_ids = self.fetch_post_ids(source_url).await?;
        info!(post_count = post_ids.len(), "posts to import");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<Result<ImportResult>> = JoinSet::new();

        for post_id in &post_ids {
            let permit_pool = Arc::clone(&semaphore);
            let client = self.client.clone();
            let base_url = source_url.to_string();
            let pool = pool.clone();
            let post_id = *post_id;

            tasks.spawn(async move {
                let _permit = permit_pool.acquire_owned().await?;
                Self::import_post(&client, &base_url, post_id, &pool).await
            });
        }

        let mut last_result: Option<ImportResult> = None;
        let mut failures = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(result)) => last_result = Some(result),
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(error = %err, "failed to import post");
                }
                Err(err) => {
                    failures += 1;
                    warn!(error = %err, "import task panicked");
                }
            }
        }

        match last_result {
            Some(mut result) => {
                if failures > 0 {
                    warn!(failures, total = post_ids.len(), "paginated import completed with errors");
                    result.error = Some(ImporterError::ImportCompleted);
                }
                Ok(result)
            }
            None => Err(ImporterError::NoPostsImported.into()),
        }
    }

    fn source_type(&self) -> &'static str {
        "wp-json"
    }

    fn validate_source(&self, source_url: &str) -> Result<()> {
        let parsed = Url::parse(source_url)?;
        if !parsed.path().contains("/wp-json/") {
            return Err(ImporterError::NotWordPressApi.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn validates_api_urls_by_path() {
        let importer = WpJsonImporter::new();

        assert!(importer
            .validate_source("https://example.com/wp-json/wp/v2/posts")
            .is_ok());

        let err = importer
            .validate_source("https://example.com/api/v2/posts")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImporterError>(),
            Some(ImporterError::NotWordPressApi)
        ));
    }

    #[tokio::test]
    async fn enumeration_stops_at_the_400_page() {
        let server = MockServer::start().await;
        let posts_path = "/wp-json/wp/v2/posts";

        Mock::given(method("GET"))
            .and(path(posts_path))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 1 }, { "id": 2 }, { "id": 3 }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(posts_path))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{ "id": 4 }])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(posts_path))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let importer = WpJsonImporter::new();
        let base = format!("{}{}", server.uri(), posts_path);
        let ids = importer.fetch_post_ids(&base).await.unwrap();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn enumeration_stops_at_an_empty_page() {
        let server = MockServer::start().await;
        let posts_path = "/wp-json/wp/v2/posts";

        Mock::given(method("GET"))
            .and(path(posts_path))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "id": 7 }, { "id": 9 }])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(posts_path))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let importer = WpJsonImporter::new();
        let base = format!("{}{}", server.uri(), posts_path);
        let ids = importer.fetch_post_ids(&base).await.unwrap();
        assert_eq!(ids, vec![7, 9]);
    }

    #[tokio::test]
    async fn server_errors_abort_enumeration() {
        let server = MockServer::start().await;
        let posts_path = "/wp-json/wp/v2/posts";

        Mock::given(method("GET"))
            .and(path(posts_path))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let importer = WpJsonImporter::new();
        let base = format!("{}{}", server.uri(), posts_path);
        let err = importer.fetch_post_ids(&base).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImporterError>(),
            Some(ImporterError::UnexpectedStatusCode(503))
        ));
    }
}
