//! Logging setup and redaction helpers
//!
//! The crate itself only emits `tracing` events; embedding applications
//! may install their own subscriber instead of calling [`init_logging`].

use crate::config::LoggingConfig;
use crate::error::{Result, UnihomeError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Install a global tracing subscriber per the logging configuration
///
/// `RUST_LOG` overrides the configured level. Fails if a subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| UnihomeError::configuration(format!("invalid log level: {e}")))?;

    let result = match config.format.as_str() {
        "json" => {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true);
            let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
            tracing::subscriber::set_global_default(subscriber)
        }
        _ => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(true);
            let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
            tracing::subscriber::set_global_default(subscriber)
        }
    };

    result.map_err(|e| UnihomeError::configuration(format!("logging already initialized: {e}")))
}

/// Mask a secret for logging, keeping just enough to correlate
///
/// `abcd1234efgh5678` becomes `abcd...5678`; short values are fully masked.
pub fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_keeps_prefix_and_suffix() {
        assert_eq!(redact("abcd1234efgh5678"), "abcd...5678");
    }

    #[test]
    fn redact_masks_short_secrets_entirely() {
        assert_eq!(redact("short"), "***");
        assert_eq!(redact(""), "***");
    }
}
