//! Structured logging setup.
//!
//! `STAGE=local` selects human-readable console output; any other value
//! (or none) selects JSON lines for log shipping. The level comes from
//! `CHUNKER_LOG_LEVEL`, with `RUST_LOG` taking precedence when set so
//! per-module filters keep working.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Safe to call once per process; later
/// calls are ignored.
pub fn init() {
    let level = std::env::var("CHUNKER_LOG_LEVEL").unwrap_or_else(|_| "error".to_string());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(normalize_level(&level)));

    let stage = std::env::var("STAGE").unwrap_or_default();
    if stage.eq_ignore_ascii_case("local") {
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    } else {
        let _ = fmt().with_env_filter(filter).json().try_init();
    }
}

fn normalize_level(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_levels_map_to_error() {
        assert_eq!(normalize_level("verbose"), "error");
        assert_eq!(normalize_level(""), "error");
        assert_eq!(normalize_level("WARNING"), "warn");
        assert_eq!(normalize_level("Info"), "info");
    }
}
