//! Repo-file transformer.
//!
//! Interprets a repository blob download: decodes base64 payloads when
//! present, normalizes the file into markdown by extension (fencing code,
//! converting HTML), tags language, and writes the document plus file
//! metadata rows.

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    detect_natural_language, html_to_markdown_lossy, save_document, save_metadata,
    TransformerError, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE,
};
use crate::models::{Document, Download};
use crate::repository::sources::get_source;
use crate::traits::{TransformResult, Transformer};

/// Extensions normalized as fenced code blocks.
const CODE_FENCE_EXTS: &[&str] = &[
    ".txt", ".py", ".js", ".go", ".java", ".cpp", ".c", ".h", ".hpp", ".css", ".json", ".yaml",
    ".yml", ".toml", ".ini", ".cfg", ".conf",
];

/// Extensions treated as code for content-type and language tagging.
const CODE_EXTS: &[&str] = &[
    ".py", ".js", ".ts", ".go", ".java", ".cpp", ".c", ".h", ".hpp", ".css", ".html", ".htm",
    ".xml", ".json", ".yaml", ".yml", ".toml", ".ini", ".cfg", ".conf", ".sh", ".bash", ".zsh",
    ".fish", ".ps1", ".sql", ".r", ".rb", ".php", ".swift", ".kt", ".scala", ".rs", ".dart",
    ".lua", ".pl",
];

/// Code languages the store accepts for `chunks.code_lang`.
const STORED_CODE_LANGS: &[&str] = &["python", "sql", "javascript"];

/// Transformer for repository file downloads ("github").
pub struct GitHubTransformer;

impl GitHubTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Extract the file path from a blob URL of the form
    /// `https://github.com/{owner}/{repo}/blob/{branch}/{path}`.
    /// URLs with fewer than seven slash-separated segments yield an
    /// empty path.
    fn extract_file_path(&self, raw_url: Option<&str>) -> String {
        let Some(url) = raw_url else {
            warn!("source has no raw URL");
            return String::new();
        };

        let parts: Vec<&str> = url.split('/').collect();
        if parts.len() < 7 {
            warn!(url, "not a blob URL");
            return String::new();
        }

        for (i, part) in parts.iter().enumerate() {
            if *part == "blob" && i + 2 < parts.len() {
                return parts[i + 2..].join("/");
            }
        }

        String::new()
    }

    /// Normalize the raw body into markdown according to its extension.
    fn process_content(&self, body: &str, file_path: &str) -> String {
        let ext = extension_of(file_path);

        // Provider payloads for binary blobs arrive base64-encoded; the
        // probe is a substring check, so a failed decode falls back to
        // the body as stored.
        let body = if body.contains("base64") {
            decode_base64_body(body).unwrap_or_else(|| body.to_string())
        } else {
            body.to_string()
        };

        match ext.as_str() {
            ".md" => body,
            ".html" | ".htm" => html_to_markdown_lossy(&body),
            _ if CODE_FENCE_EXTS.contains(&ext.as_str()) => {
                let language = language_for_extension(&ext);
                if language.is_empty() {
                    format!("```\n{body}\n```")
                } else {
                    format!("```{language}\n{body}\n```")
                }
            }
            _ => body,
        }
    }

    fn build_document(&self, download: &Download, file_path: &str) -> Document {
        let format = match extension_of(file_path).as_str() {
            ".yaml" | ".yml" => "yaml",
            // Everything else, .json included, is recorded as json.
            _ => "json",
        };

        Document {
            id: Uuid::new_v4().to_string(),
            source_id: download.source_id.clone(),
            download_id: download.id.clone(),
            format: Some(format.to_string()),
            indexed_at: Some(chrono::Utc::now()),
            min_chunk_size: MIN_CHUNK_SIZE,
            max_chunk_size: MAX_CHUNK_SIZE,
            // The contents API does not expose publication or
            // modification dates; commit history would be needed.
            published_at: None,
            modified_at: None,
            producer_version: None,
        }
    }

    /// Code files report their programming language only when the store
    /// accepts it; text files get the natural-language hint.
    fn detect_language(&self, content: &str, file_path: &str) -> String {
        let ext = extension_of(file_path);
        if is_code_file(&ext) {
            let language = language_for_extension(&ext);
            if STORED_CODE_LANGS.contains(&language) {
                return language.to_string();
            }
            return String::new();
        }

        detect_natural_language(content).to_string()
    }

    fn extract_metadata(
        &self,
        raw_url: Option<&str>,
        file_path: &str,
        content: &str,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut metadata = serde_json::Map::new();

        if let Some(url) = raw_url {
            if let Some(repo_info) = extract_repo_info(url) {
                metadata.insert("repository".to_string(), repo_info);
            }
        }

        metadata.insert("file_path".to_string(), file_path.into());
        metadata.insert("file_name".to_string(), file_name_of(file_path).into());
        metadata.insert("file_extension".to_string(), extension_of(file_path).into());
        metadata.insert("file_size".to_string(), content.len().into());
        metadata.insert(
            "line_count".to_string(),
            (content.matches('\n').count() + 1).into(),
        );
        metadata.insert("character_count".to_string(), content.len().into());

        let ext = extension_of(file_path);
        if is_code_file(&ext) {
            metadata.insert("content_type".to_string(), "code".into());
            metadata.insert(
                "programming_language".to_string(),
                language_for_extension(&ext).into(),
            );
        } else {
            metadata.insert("content_type".to_string(), "text".into());
            metadata.insert(
                "natural_language".to_string(),
                detect_natural_language(content).into(),
            );
        }

        if let Some(dir) = directory_of(file_path) {
            metadata.insert("directory".to_string(), dir.into());
        }

        metadata
    }
}

impl Default for GitHubTransformer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transformer for GitHubTransformer {
    async fn transform(&self, download: &Download, pool: &SqlitePool) -> Result<TransformResult> {
        if !self.can_transform(download) {
            return Err(TransformerError::CannotTransformDownload.into());
        }

        info!(download_id = %download.id, "starting repository file transformation");

        let source = get_source(pool, &download.source_id).await?;
        let file_path = self.extract_file_path(source.raw_url.as_deref());

        let body = download.body.as_deref().unwrap_or_default();
        let content = self.process_content(body, &file_path);
        let document = self.build_document(download, &file_path);
        let language = self.detect_language(&content, &file_path);
        let metadata = self.extract_metadata(source.raw_url.as_deref(), &file_path, &content);

        save_document(pool, &document).await?;
        save_metadata(pool, &document.id, &metadata).await?;

        info!(document_id = %document.id, "repository file transformation completed");

        Ok(TransformResult {
            document,
            content,
            language,
            metadata,
        })
    }

    fn source_type(&self) -> &'static str {
        "github"
    }

    fn can_transform(&self, download: &Download) -> bool {
        if download.body.is_none() {
            return false;
        }

        let Ok(headers) =
            serde_json::from_str::<std::collections::HashMap<String, Vec<String>>>(&download.headers)
        else {
            return false;
        };

        headers.contains_key("X-GitHub-SHA")
    }
}

/// Decode a base64 payload into UTF-8 text. Provider payloads wrap lines,
/// so ASCII whitespace is stripped first.
fn decode_base64_body(body: &str) -> Option<String> {
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .ok()?;
    String::from_utf8(bytes).ok()
}

/// Lowercased extension including the leading dot, or empty.
fn extension_of(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((prefix, ext)) if !prefix.is_empty() && !ext.contains('/') => {
            format!(".{}", ext.to_lowercase())
        }
        _ => String::new(),
    }
}

fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Directory portion of `path`, or `None` for top-level files.
fn directory_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(dir, _)| dir)
}

fn is_code_file(ext: &str) -> bool {
    CODE_EXTS.contains(&ext)
}

/// Code-fence language for an extension; empty when unknown.
fn language_for_extension(ext: &str) -> &'static str {
    match ext {
        ".py" => "python",
        ".js" => "javascript",
        ".ts" => "typescript",
        ".go" => "go",
        ".java" => "java",
        ".cpp" | ".hpp" => "cpp",
        ".c" | ".h" => "c",
        ".css" => "css",
        ".html" | ".htm" => "html",
        ".xml" => "xml",
        ".json" => "json",
        ".yaml" | ".yml" => "yaml",
        ".toml" => "toml",
        ".ini" | ".cfg" | ".conf" => "ini",
        ".sh" | ".bash" => "bash",
        ".zsh" => "zsh",
        ".fish" => "fish",
        ".ps1" => "powershell",
        ".sql" => "sql",
        ".r" => "r",
        ".rb" => "ruby",
        ".php" => "php",
        ".swift" => "swift",
        ".kt" => "kotlin",
        ".scala" => "scala",
        ".rs" => "rust",
        ".dart" => "dart",
        ".lua" => "lua",
        ".pl" => "perl",
        _ => "",
    }
}

/// Owner, repo, and branch from a blob URL, as a metadata object.
fn extract_repo_info(raw_url: &str) -> Option<serde_json::Value> {
    let parts: Vec<&str> = raw_url.split('/').collect();
    if parts.len() < 5 {
        warn!(url = raw_url, "not a repository URL");
        return None;
    }

    let mut info = serde_json::Map::new();
    info.insert("owner".to_string(), parts[3].into());
    info.insert("repo".to_string(), parts[4].into());

    if parts.len() >= 7 && parts[5] == "blob" {
        info.insert("branch".to_string(), parts[6].into());
    }

    Some(serde_json::Value::Object(info))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download_with(headers: &str, body: Option<&str>) -> Download {
        Download {
            id: "dl-1".to_string(),
            source_id: "src-1".to_string(),
            attempted_at: None,
            downloaded_at: None,
            status_code: Some(200),
            headers: headers.to_string(),
            body: body.map(|b| b.to_string()),
        }
    }

    #[test]
    fn can_transform_requires_sha_header_and_body() {
        let t = GitHubTransformer::new();

        let ok = download_with(r#"{"X-GitHub-SHA":["abc"],"Content-Type":["text/plain"]}"#, Some("x"));
        assert!(t.can_transform(&ok));

        let no_body = download_with(r#"{"X-GitHub-SHA":["abc"]}"#, None);
        assert!(!t.can_transform(&no_body));

        let no_sha = download_with(r#"{"Content-Type":["text/plain"]}"#, Some("x"));
        assert!(!t.can_transform(&no_sha));

        let bad_headers = download_with("not json", Some("x"));
        assert!(!t.can_transform(&bad_headers));
    }

    #[test]
    fn file_path_comes_from_the_blob_url() {
        let t = GitHubTransformer::new();

        assert_eq!(
            t.extract_file_path(Some("https://github.com/owner/repo/blob/main/docs/guide.md")),
            "docs/guide.md"
        );
        assert_eq!(
            t.extract_file_path(Some("https://github.com/owner/repo/blob/main/README.md")),
            "README.md"
        );
        // Too few segments.
        assert_eq!(t.extract_file_path(Some("https://github.com/owner/repo")), "");
        assert_eq!(t.extract_file_path(None), "");
    }

    #[test]
    fn markdown_passes_through_untouched() {
        let t = GitHubTransformer::new();
        let body = "# Heading\n\nSome text.";
        assert_eq!(t.process_content(body, "README.md"), body);
    }

    #[test]
    fn code_files_are_fenced_with_their_language() {
        let t = GitHubTransformer::new();
        let out = t.process_content("print('hi')", "script.py");
        assert_eq!(out, "```python\nprint('hi')\n```");
    }

    #[test]
    fn html_files_are_converted_to_markdown() {
        let t = GitHubTransformer::new();
        let out = t.process_content("<h1>Hello</h1>", "index.html");
        assert!(out.contains("# Hello"));
    }

    #[test]
    fn unknown_extensions_pass_through() {
        let t = GitHubTransformer::new();
        assert_eq!(t.process_content("raw bytes", "data.bin"), "raw bytes");
    }

    #[test]
    fn base64_decode_strips_line_wrapping() {
        assert_eq!(
            decode_base64_body("SGVsbG8g\nd29ybGQ="),
            Some("Hello world".to_string())
        );
        assert_eq!(decode_base64_body("not valid base64!!"), None);
    }

    #[test]
    fn base64_probe_is_a_substring_check() {
        let t = GitHubTransformer::new();

        // Pure base64 without the literal marker is left as stored.
        let encoded = base64::engine::general_purpose::STANDARD.encode("# Hello");
        assert!(!encoded.contains("base64"));
        assert_eq!(t.process_content(&encoded, "README.md"), encoded);

        // A body matching the probe that fails to decode falls back to
        // the raw body.
        let out = t.process_content("this mentions base64 but is not it", "README.md");
        assert_eq!(out, "this mentions base64 but is not it");
    }

    #[test]
    fn language_tagging_respects_the_store_constraint() {
        let t = GitHubTransformer::new();

        assert_eq!(t.detect_language("print('x')", "a.py"), "python");
        assert_eq!(t.detect_language("select 1", "q.sql"), "sql");
        assert_eq!(t.detect_language("let x = 1", "a.js"), "javascript");
        // Known language the store does not accept.
        assert_eq!(t.detect_language("fn main() {}", "a.rs"), "");
        // Text files fall through to the natural-language hint.
        assert_eq!(t.detect_language("Plain English text.", "notes.md"), "en");
    }

    #[test]
    fn metadata_covers_the_file_facts() {
        let t = GitHubTransformer::new();
        let url = "https://github.com/acme/widgets/blob/main/src/app.py";
        let content = "line one\nline two";

        let metadata = t.extract_metadata(Some(url), "src/app.py", content);

        let repo = metadata.get("repository").unwrap();
        assert_eq!(repo["owner"], "acme");
        assert_eq!(repo["repo"], "widgets");
        assert_eq!(repo["branch"], "main");

        assert_eq!(metadata["file_path"], "src/app.py");
        assert_eq!(metadata["file_name"], "app.py");
        assert_eq!(metadata["file_extension"], ".py");
        assert_eq!(metadata["line_count"], 2);
        assert_eq!(metadata["character_count"], content.len());
        assert_eq!(metadata["content_type"], "code");
        assert_eq!(metadata["programming_language"], "python");
        assert_eq!(metadata["directory"], "src");
    }

    #[test]
    fn top_level_files_omit_the_directory_key() {
        let t = GitHubTransformer::new();
        let metadata = t.extract_metadata(None, "README.md", "# Title");
        assert!(!metadata.contains_key("directory"));
        assert_eq!(metadata["content_type"], "text");
        assert!(metadata.contains_key("natural_language"));
    }
}
