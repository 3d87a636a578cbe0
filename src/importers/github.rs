//! Repository-crawl importer.
//!
//! Walks the recursive tree of a hosted repository, filters it down to
//! supported text-like files, fetches each surviving blob through the
//! contents API, and persists one source + download pair per file. The
//! download keeps the provider's payload verbatim — including base64
//! encoding for binary blobs — and records the blob SHA in an
//! `X-GitHub-SHA` header for the transformer to key on.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use url::Url;

use super::{insert_download, insert_source, ImporterError};
use crate::traits::{ImportResult, Importer};

const DEFAULT_API_BASE: &str = "https://api.github.com";
/// Files above this size are skipped (1 MiB).
const DEFAULT_MAX_FILE_SIZE: i64 = 1024 * 1024;
const DEFAULT_SUPPORTED_EXTS: &[&str] = &[
    ".md", ".txt", ".rst", ".py", ".js", ".go", ".java", ".cpp", ".c", ".h", ".hpp", ".css",
    ".html", ".xml", ".json", ".yaml", ".yml", ".toml", ".ini", ".cfg", ".conf",
];
const DEFAULT_EXCLUSIONS: &[&str] = &[
    ".git",
    "node_modules",
    ".next",
    ".nuxt",
    "dist",
    "build",
    ".vscode",
    ".idea",
    "__pycache__",
    ".pytest_cache",
    ".coverage",
    ".DS_Store",
];

/// Owner, repository, and ref parsed from a repository URL.
#[derive(Debug, PartialEq)]
struct RepoRef {
    owner: String,
    repo: String,
    /// Branch, tag, or commit SHA; "main" unless the URL carries
    /// `/tree/{ref}`.
    git_ref: String,
}

/// Recursive tree listing: `GET /repos/{owner}/{repo}/git/trees/{ref}`.
#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize, Clone)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
    sha: String,
    #[serde(default)]
    size: i64,
}

/// Contents API payload: `GET /repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Deserialize)]
struct FileResponse {
    #[serde(default)]
    content: String,
}

/// Importer for hosted Git repositories ("github").
pub struct GitHubImporter {
    client: reqwest::Client,
    token: Option<String>,
    exclusions: Vec<String>,
    max_file_size: i64,
    supported_exts: Vec<String>,
    api_base: String,
}

impl GitHubImporter {
    /// Build with defaults, picking up `GITHUB_TOKEN` from the
    /// environment when present.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("default reqwest client"),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            supported_exts: DEFAULT_SUPPORTED_EXTS.iter().map(|s| s.to_string()).collect(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point the importer at a different API host (tests use this to hit
    /// a local mock server).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_max_file_size(mut self, size: i64) -> Self {
        self.max_file_size = size;
        self
    }

    pub fn with_exclusions(mut self, exclusions: Vec<String>) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_supported_extensions(mut self, extensions: Vec<String>) -> Self {
        self.supported_exts = extensions;
        self
    }

    /// Parse `/{owner}/{repo}[/tree/{ref}]` out of a repository URL.
    fn parse_repo_url(&self, source_url: &str) -> Result<RepoRef> {
        let parsed = Url::parse(source_url)?;

        let host = parsed.host_str().unwrap_or_default();
        if host != "github.com" && host != "api.github.com" {
            return Err(ImporterError::NotGitHubUrl.into());
        }

        let parts: Vec<&str> = parsed
            .path()
            .trim_matches('/')
            .split('/')
            .filter(|p| !p.is_empty())
            .collect();

        if parts.len() < 2 {
            return Err(ImporterError::InvalidGitHubUrlFormat.into());
        }

        let mut repo = RepoRef {
            owner: parts[0].to_string(),
            repo: parts[1].to_string(),
            git_ref: "main".to_string(),
        };

        // The ref is a single path segment; blob URLs written per file
        // and the transformer's path extraction both rely on that.
        if parts.len() >= 4 && parts[2] == "tree" {
            repo.git_ref = parts[3].to_string();
        }

        Ok(repo)
    }

    async fn fetch_tree(&self, repo: &RepoRef) -> Result<TreeResponse> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, repo.owner, repo.repo, repo.git_ref
        );

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImporterError::GitHubApiRequestFailed(status.as_u16()).into());
        }

        Ok(response.json().await?)
    }

    async fn fetch_file(&self, repo: &RepoRef, path: &str) -> Result<String> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_base, repo.owner, repo.repo, path, repo.git_ref
        );

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImporterError::GitHubApiRequestFailed(status.as_u16()).into());
        }

        let file: FileResponse = response.json().await?;
        Ok(file.content)
    }

    /// Keep blobs under the size limit whose path avoids the exclusion
    /// set and whose extension is supported.
    fn filter_entries(&self, entries: Vec<TreeEntry>) -> Vec<TreeEntry> {
        entries
            .into_iter()
            .filter(|e| e.entry_type == "blob")
            .filter(|e| e.size <= self.max_file_size)
            .filter(|e| !self.is_excluded(&e.path))
            .filter(|e| self.is_supported(&e.path))
            .collect()
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.exclusions.iter().any(|ex| path.contains(ex.as_str()))
    }

    fn is_supported(&self, path: &str) -> bool {
        let ext = extension_of(path);
        self.supported_exts
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&ext))
    }

    /// Persist the source + download pair for one repository file.
    async fn import_file(
        &self,
        repo: &RepoRef,
        entry: &TreeEntry,
        pool: &SqlitePool,
    ) -> Result<ImportResult> {
        let file_url = format!(
            "https://github.com/{}/{}/blob/{}/{}",
            repo.owner, repo.repo, repo.git_ref, entry.path
        );

        let content = self.fetch_file(repo, &entry.path).await?;

        let format = match extension_of(&entry.path).as_str() {
            ".yaml" | ".yml" => "yaml",
            _ => "json",
        };
        let source_id = insert_source(pool, &file_url, format).await?;

        let headers = serde_json::json!({
            "Content-Type": ["text/plain"],
            "X-GitHub-SHA": [entry.sha],
        });
        let download_id =
            insert_download(pool, &source_id, 200, &headers.to_string(), &content).await?;

        Ok(ImportResult {
            source_id,
            download_id,
            error: None,
        })
    }
}

impl Default for GitHubImporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Importer for GitHubImporter {
    async fn import(&self, source_url: &str, pool: &SqlitePool) -> Result<ImportResult> {
        self.validate_source(source_url)?;
        let repo = self.parse_repo_url(source_url)?;

        info!(owner = %repo.owner, repo = %repo.repo, git_ref = %repo.git_ref, "starting repository import");

        let tree = self.fetch_tree(&repo).await?;
        let files = self.filter_entries(tree.tree);
        info!(file_count = files.len(), "files to import after filtering");

        let mut last_result: Option<ImportResult> = None;
        let mut failures = 0usize;

        for entry in &files {
            match self.import_file(&repo, entry, pool).await {
                Ok(result) => last_result = Some(result),
                Err(err) => {
                    failures += 1;
                    warn!(path = %entry.path, error = %err, "failed to import file");
                }
            }
        }

        match last_result {
            Some(mut result) => {
                if failures > 0 {
                    warn!(failures, total = files.len(), "repository import completed with errors");
                    result.error = Some(ImporterError::ImportCompleted);
                }
                Ok(result)
            }
            None => Err(ImporterError::NoFilesImported.into()),
        }
    }

    fn source_type(&self) -> &'static str {
        "github"
    }

    fn validate_source(&self, source_url: &str) -> Result<()> {
        let repo = self.parse_repo_url(source_url)?;
        if repo.owner.is_empty() || repo.repo.is_empty() {
            return Err(ImporterError::InvalidGitHubUrl.into());
        }
        Ok(())
    }
}

/// Lowercased extension of `path` including the leading dot, or empty.
fn extension_of(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((prefix, ext)) if !prefix.is_empty() && !ext.contains('/') => {
            format!(".{}", ext.to_lowercase())
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_repository_urls() {
        let importer = GitHubImporter::new();

        assert!(importer.validate_source("https://github.com/rust-lang/rust").is_ok());
        assert!(importer
            .validate_source("https://api.github.com/rust-lang/rust")
            .is_ok());

        let err = importer
            .validate_source("https://gitlab.com/owner/repo")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImporterError>(),
            Some(ImporterError::NotGitHubUrl)
        ));

        let err = importer
            .validate_source("https://github.com/only-owner")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImporterError>(),
            Some(ImporterError::InvalidGitHubUrlFormat)
        ));
    }

    #[test]
    fn parses_ref_from_tree_urls() {
        let importer = GitHubImporter::new();

        let repo = importer
            .parse_repo_url("https://github.com/owner/repo")
            .unwrap();
        assert_eq!(repo.git_ref, "main");

        let repo = importer
            .parse_repo_url("https://github.com/owner/repo/tree/develop")
            .unwrap();
        assert_eq!(repo.git_ref, "develop");

        // Only the segment right after /tree/ is the ref; anything
        // beyond it is ignored rather than folded into the ref.
        let repo = importer
            .parse_repo_url("https://github.com/owner/repo/tree/feature/new-parser")
            .unwrap();
        assert_eq!(repo.git_ref, "feature");
    }

    #[test]
    fn filters_by_type_size_exclusion_and_extension() {
        let importer = GitHubImporter::new().with_max_file_size(1000);

        let entry = |path: &str, entry_type: &str, size: i64| TreeEntry {
            path: path.to_string(),
            entry_type: entry_type.to_string(),
            sha: "abc".to_string(),
            size,
        };

        let entries = vec![
            entry("README.md", "blob", 100),
            entry("docs", "tree", 0),
            entry("big.md", "blob", 5000),
            entry("node_modules/pkg/index.js", "blob", 100),
            entry("binary.png", "blob", 100),
            entry("SRC/Main.PY", "blob", 100),
        ];

        let kept = importer.filter_entries(entries);
        let paths: Vec<&str> = kept.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "SRC/Main.PY"]);
    }

    #[test]
    fn extension_is_lowercased_with_dot() {
        assert_eq!(extension_of("a/b/README.md"), ".md");
        assert_eq!(extension_of("Main.PY"), ".py");
        assert_eq!(extension_of("no-extension"), "");
        assert_eq!(extension_of("dir.d/file"), "");
    }
}
