//! Configuration for the unified home controller
//!
//! Configuration is layered: compiled-in defaults, then an optional TOML
//! file, then environment variables. `UNIHOME_*` variables always win.

use crate::error::{Result, UnihomeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, time::Duration};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UnihomeConfig {
    /// Platform registry behavior
    pub registry: RegistryConfig,

    /// Device event history engine
    pub history: HistoryConfig,

    /// OAuth token lifecycle
    pub auth: AuthConfig,

    /// Outbound HTTP client settings shared by adapters
    pub http: HttpConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Platform registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// When true, cross-platform fan-out operations return partial results
    /// and log per-platform failures instead of failing the whole call
    pub graceful_degradation: bool,

    /// Capacity of the broadcast channel carrying registry events
    pub event_buffer: usize,

    /// Upper bound on a single adapter health probe
    #[serde(with = "humantime_serde")]
    pub health_check_timeout: Duration,

    /// Device-to-adapter routing cache; routing stays correct with this off
    pub routing_cache: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            graceful_degradation: true,
            event_buffer: 256,
            health_check_timeout: Duration::from_secs(10),
            routing_cache: true,
        }
    }
}

/// History engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Events returned when the caller does not pass a limit
    pub default_limit: usize,

    /// Hard cap on any single query; cannot be raised past
    /// [`HistoryConfig::LIMIT_CAP`]
    pub max_limit: usize,

    /// Window used when the caller passes no start time
    #[serde(with = "humantime_serde")]
    pub default_window: Duration,

    /// Silence between consecutive events before a gap is reported
    #[serde(with = "humantime_serde")]
    pub gap_threshold: Duration,

    /// Gaps longer than this are flagged as likely connectivity outages
    #[serde(with = "humantime_serde")]
    pub connectivity_threshold: Duration,
}

impl HistoryConfig {
    /// Ceiling on `max_limit`; queries never return more events than this
    pub const LIMIT_CAP: usize = 500;
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: Self::LIMIT_CAP,
            default_window: Duration::from_secs(24 * 3600),
            gap_threshold: Duration::from_secs(2 * 3600),
            connectivity_threshold: Duration::from_secs(2 * 3600),
        }
    }
}

/// OAuth token lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Request-path buffer: a token this close to expiry is refreshed
    /// before the platform call proceeds
    #[serde(with = "humantime_serde")]
    pub access_refresh_buffer: Duration,

    /// Background buffer: the refresher renews tokens this long before
    /// they expire
    #[serde(with = "humantime_serde")]
    pub refresh_buffer: Duration,

    /// How often the background refresher scans stored tokens
    #[serde(with = "humantime_serde")]
    pub refresh_check_interval: Duration,

    /// Refresh attempts per token per refresher cycle
    pub max_refresh_attempts: u32,

    /// First retry delay; doubles per attempt
    #[serde(with = "humantime_serde")]
    pub refresh_backoff_initial: Duration,

    /// Token store location; defaults to the platform config directory
    pub token_file: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_refresh_buffer: Duration::from_secs(300),
            refresh_buffer: Duration::from_secs(3600),
            refresh_check_interval: Duration::from_secs(3600),
            max_refresh_attempts: 3,
            refresh_backoff_initial: Duration::from_secs(30),
            token_file: None,
        }
    }
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// TCP connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Enable TLS certificate verification
    pub verify_ssl: bool,

    /// User-Agent header on platform calls
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            verify_ssl: true,
            user_agent: format!("unihome/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,

    /// Output format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl UnihomeConfig {
    /// Load configuration from defaults, the default config file (if any)
    /// and environment variables, in that order
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_config_file() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            UnihomeError::configuration(format!(
                "cannot read config file {}: {e}",
                path.display()
            ))
        })?;
        toml::from_str(&raw)
            .map_err(|e| UnihomeError::configuration(format!("invalid config file: {e}")))
    }

    /// Build configuration from defaults plus environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// `~/.config/unihome/config.toml` (or the platform equivalent)
    pub fn default_config_file() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("unihome").join("config.toml"))
    }

    fn apply_env(&mut self) {
        if let Ok(value) = env::var("UNIHOME_GRACEFUL_DEGRADATION") {
            if let Ok(flag) = value.parse::<bool>() {
                self.registry.graceful_degradation = flag;
            }
        }

        if let Ok(value) = env::var("UNIHOME_HTTP_TIMEOUT") {
            if let Ok(secs) = value.parse::<u64>() {
                self.http.timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(value) = env::var("UNIHOME_VERIFY_SSL") {
            if let Ok(flag) = value.parse::<bool>() {
                self.http.verify_ssl = flag;
            }
        }

        if let Ok(value) = env::var("UNIHOME_TOKEN_FILE") {
            self.auth.token_file = Some(PathBuf::from(value));
        }

        if let Ok(value) = env::var("UNIHOME_LOG_LEVEL") {
            self.logging.level = value;
        }

        if let Ok(value) = env::var("UNIHOME_LOG_FORMAT") {
            self.logging.format = value;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.history.default_limit == 0 || self.history.max_limit == 0 {
            return Err(UnihomeError::configuration(
                "history limits must be greater than zero",
            ));
        }

        if self.history.default_limit > self.history.max_limit {
            return Err(UnihomeError::configuration(format!(
                "history default_limit {} exceeds max_limit {}",
                self.history.default_limit, self.history.max_limit
            )));
        }

        if self.history.max_limit > HistoryConfig::LIMIT_CAP {
            return Err(UnihomeError::configuration(format!(
                "history max_limit {} exceeds the cap of {}",
                self.history.max_limit,
                HistoryConfig::LIMIT_CAP
            )));
        }

        if self.history.gap_threshold.is_zero() || self.history.connectivity_threshold.is_zero() {
            return Err(UnihomeError::configuration(
                "gap thresholds must be greater than zero",
            ));
        }

        if self.http.timeout.is_zero() {
            return Err(UnihomeError::configuration(
                "http timeout must be greater than zero",
            ));
        }

        if self.auth.max_refresh_attempts == 0 {
            return Err(UnihomeError::configuration(
                "max_refresh_attempts must be at least 1",
            ));
        }

        // tokio's interval timer panics on a zero period
        if self.auth.refresh_check_interval.is_zero() {
            return Err(UnihomeError::configuration(
                "refresh_check_interval must be greater than zero",
            ));
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(UnihomeError::configuration(format!(
                    "unknown log format '{other}', expected 'pretty' or 'json'"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_validate() {
        let config = UnihomeConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.registry.graceful_degradation);
        assert_eq!(config.history.default_limit, 100);
        assert_eq!(config.history.max_limit, 500);
    }

    #[test]
    fn rejects_limit_inversion() {
        let mut config = UnihomeConfig::default();
        config.history.default_limit = 600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_max_limit_above_the_cap() {
        let mut config = UnihomeConfig::default();
        config.history.max_limit = HistoryConfig::LIMIT_CAP + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_refresh_check_interval() {
        let mut config = UnihomeConfig::default();
        config.auth.refresh_check_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_log_format() {
        let mut config = UnihomeConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_toml_with_humantime_durations() {
        let raw = r#"
            [registry]
            graceful_degradation = false

            [history]
            default_window = "7d"
            gap_threshold = "30m"

            [auth]
            refresh_buffer = "2h"
        "#;
        let config: UnihomeConfig = toml::from_str(raw).unwrap();
        assert!(!config.registry.graceful_degradation);
        assert_eq!(
            config.history.default_window,
            Duration::from_secs(7 * 24 * 3600)
        );
        assert_eq!(config.history.gap_threshold, Duration::from_secs(1800));
        assert_eq!(config.auth.refresh_buffer, Duration::from_secs(7200));
    }

    #[test]
    fn loads_config_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[history]\ndefault_limit = 25\n").unwrap();

        let config = UnihomeConfig::from_file(&path).unwrap();
        assert_eq!(config.history.default_limit, 25);
        // Everything else keeps its default
        assert_eq!(config.history.max_limit, 500);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = UnihomeConfig::from_file(Path::new("/nonexistent/unihome.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read config file"));
    }

    #[test]
    #[serial]
    fn environment_overrides_win() {
        env::set_var("UNIHOME_GRACEFUL_DEGRADATION", "false");
        env::set_var("UNIHOME_HTTP_TIMEOUT", "5");
        env::set_var("UNIHOME_LOG_LEVEL", "trace");

        let config = UnihomeConfig::from_env().unwrap();

        env::remove_var("UNIHOME_GRACEFUL_DEGRADATION");
        env::remove_var("UNIHOME_HTTP_TIMEOUT");
        env::remove_var("UNIHOME_LOG_LEVEL");

        assert!(!config.registry.graceful_degradation);
        assert_eq!(config.http.timeout, Duration::from_secs(5));
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    #[serial]
    fn malformed_environment_values_are_ignored() {
        env::set_var("UNIHOME_HTTP_TIMEOUT", "soon");

        let config = UnihomeConfig::from_env().unwrap();

        env::remove_var("UNIHOME_HTTP_TIMEOUT");
        assert_eq!(config.http.timeout, Duration::from_secs(30));
    }
}
