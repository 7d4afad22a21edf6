//! Logging configuration and initialization
//!
//! Sets up the tracing subscriber used for structured logging across the
//! agent, the tools and the web surface.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Map a user supplied level onto a tracing level name
///
/// Only the first word is considered so values like `"info # comment"`
/// from `.env` files still work. Unknown levels fall back to `info`.
pub fn normalize_level(log_level: &str) -> &'static str {
    let level = log_level
        .split_whitespace()
        .next()
        .unwrap_or("info")
        .to_lowercase();

    match level.as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        _ => "info",
    }
}

/// Initialize the logging system with the specified level
///
/// `RUST_LOG` takes precedence when set. HTTP client internals are kept at
/// `warn` so request bodies do not flood debug output.
pub fn init_logging(log_level: &str) {
    let level = normalize_level(log_level);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{level},hyper=warn,hyper_util=warn,reqwest=warn"))
    });

    // A second initialization (tests, repeated CLI setup) is harmless.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_level() {
        assert_eq!(normalize_level("DEBUG"), "debug");
        assert_eq!(normalize_level("warning"), "warn");
        assert_eq!(normalize_level("critical"), "error");
        assert_eq!(normalize_level("info # default"), "info");
        assert_eq!(normalize_level("verbose"), "info");
        assert_eq!(normalize_level(""), "info");
    }
}
