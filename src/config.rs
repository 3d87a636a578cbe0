//! Process-wide configuration, read from the environment once at startup.
//!
//! Every knob the pipeline honours comes from environment variables (an
//! optional `.env` file is loaded by `main` before anything else runs):
//!
//! | Variable | Consumer | Default |
//! |----------|----------|---------|
//! | `TURSO_DATABASE_URL` | store | required |
//! | `TURSO_AUTH_TOKEN` | store | required for remote URLs |
//! | `OPENAI_API_KEY` | OpenAI embedders | required for OpenAI models |
//! | `TOGETHER_API_KEY` | Together embedders | required for Together models |
//! | `GITHUB_TOKEN` | repository importer | optional |
//! | `CHUNKER_TOKENIZER` | chunker | `cl100k_base` |
//! | `CHUNKER_DEFAULT_MAX_TOKENS` | chunker | `100` |
//! | `CHUNKER_DEFAULT_OVERLAP_TOKENS` | chunker | `20` |
//! | `CHUNKER_LOG_LEVEL` | logging | `error` |
//! | `STAGE` | logging | unset (JSON output) |
//!
//! Components receive their configuration by value; nothing reads the
//! environment inside the processing path.

use std::env;

const MAX_TOKENS_DEFAULT: usize = 100;
const OVERLAP_TOKENS_DEFAULT: usize = 20;

/// Tokenizer selection and default budgets for the token chunker.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// BPE encoding name: `cl100k_base`, `p50k_base`, or `r50k_base`.
    /// Unknown names silently fall back to `cl100k_base`.
    pub tokenizer: String,
    /// Token budget used when the caller passes none.
    pub default_max_tokens: usize,
    /// Overlap used by the overlapping variant when the caller passes none.
    pub default_overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            tokenizer: "cl100k_base".to_string(),
            default_max_tokens: MAX_TOKENS_DEFAULT,
            default_overlap_tokens: OVERLAP_TOKENS_DEFAULT,
        }
    }
}

impl ChunkerConfig {
    pub fn from_env() -> Self {
        Self {
            tokenizer: env::var("CHUNKER_TOKENIZER")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "cl100k_base".to_string()),
            default_max_tokens: int_from_env("CHUNKER_DEFAULT_MAX_TOKENS", MAX_TOKENS_DEFAULT),
            default_overlap_tokens: int_from_env(
                "CHUNKER_DEFAULT_OVERLAP_TOKENS",
                OVERLAP_TOKENS_DEFAULT,
            ),
        }
    }
}

/// Read an integer env var, falling back to `default` when unset or
/// unparsable.
fn int_from_env(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let cfg = ChunkerConfig::default();
        assert_eq!(cfg.tokenizer, "cl100k_base");
        assert_eq!(cfg.default_max_tokens, 100);
        assert_eq!(cfg.default_overlap_tokens, 20);
    }

    #[test]
    fn int_from_env_ignores_garbage() {
        std::env::set_var("QUARRY_TEST_INT", "not-a-number");
        assert_eq!(int_from_env("QUARRY_TEST_INT", 7), 7);
        std::env::set_var("QUARRY_TEST_INT", "42");
        assert_eq!(int_from_env("QUARRY_TEST_INT", 7), 42);
        std::env::remove_var("QUARRY_TEST_INT");
    }
}
