//! Error types for the unihome platform bridge

use thiserror::Error;

/// Result type alias for unihome operations
pub type Result<T> = std::result::Result<T, UnihomeError>;

/// Error taxonomy for cross-platform device operations
///
/// Every adapter wraps raw platform failures into one of these classes so
/// that callers can apply a uniform retry and reporting policy regardless of
/// which cloud produced the failure.
#[derive(Error, Debug)]
pub enum UnihomeError {
    /// Authentication or authorization failures (bad credentials,
    /// expired/revoked tokens, missing scopes)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Device id unknown to the addressed platform
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Transport-level failures (DNS, connect, TLS, 5xx)
    #[error("Network error: {0}")]
    Network(String),

    /// Platform rate limiting (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimit(String),

    /// Operation did not complete within its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Command was accepted but failed to execute, or the failure could not
    /// be classified more precisely
    #[error("Command execution failed: {0}")]
    CommandExecution(String),

    /// Invalid configuration or invalid caller input
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Capability has no mapping on the target platform or device
    #[error("Capability not supported: {0}")]
    CapabilityNotSupported(String),
}

/// Serializable projection of the error taxonomy
///
/// Carried inside [`CommandFailure`](crate::types::CommandFailure) so batch
/// results can be serialized without dragging the full error chain along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Authentication,
    DeviceNotFound,
    Network,
    RateLimit,
    Timeout,
    CommandExecution,
    Configuration,
    CapabilityNotSupported,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::DeviceNotFound => "deviceNotFound",
            ErrorKind::Network => "network",
            ErrorKind::RateLimit => "rateLimit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CommandExecution => "commandExecution",
            ErrorKind::Configuration => "configuration",
            ErrorKind::CapabilityNotSupported => "capabilityNotSupported",
        };
        write!(f, "{name}")
    }
}

impl UnihomeError {
    /// Create an authentication error
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a device-not-found error
    pub fn device_not_found<S: Into<String>>(msg: S) -> Self {
        Self::DeviceNotFound(msg.into())
    }

    /// Create a network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create a rate-limit error
    pub fn rate_limit<S: Into<String>>(msg: S) -> Self {
        Self::RateLimit(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a command execution error
    pub fn command_execution<S: Into<String>>(msg: S) -> Self {
        Self::CommandExecution(msg.into())
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a capability-not-supported error
    pub fn capability_not_supported<S: Into<String>>(msg: S) -> Self {
        Self::CapabilityNotSupported(msg.into())
    }

    /// Classify an HTTP status into the taxonomy
    ///
    /// Structured status codes are preferred over message sniffing; the
    /// fallback for statuses without a clear class is `CommandExecution`.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match status {
            401 | 403 => Self::Authentication(detail),
            404 => Self::DeviceNotFound(detail),
            408 => Self::Timeout(detail),
            429 => Self::RateLimit(detail),
            500..=599 => Self::Network(format!("server error {status}: {detail}")),
            _ => Self::CommandExecution(format!("HTTP {status}: {detail}")),
        }
    }

    /// Classify a raw error message into the taxonomy
    ///
    /// Last-resort substring heuristics for failures that carry no status
    /// code. Unrecognized messages default to `CommandExecution`.
    pub fn classify_message<S: Into<String>>(msg: S) -> Self {
        let msg = msg.into();
        let lower = msg.to_lowercase();
        if lower.contains("timed out") || lower.contains("timeout") {
            Self::Timeout(msg)
        } else if lower.contains("rate limit") || lower.contains("too many requests") {
            Self::RateLimit(msg)
        } else if lower.contains("unauthorized")
            || lower.contains("invalid token")
            || lower.contains("forbidden")
        {
            Self::Authentication(msg)
        } else if lower.contains("not found") {
            Self::DeviceNotFound(msg)
        } else if lower.contains("connection") || lower.contains("network") {
            Self::Network(msg)
        } else {
            Self::CommandExecution(msg)
        }
    }

    /// Check if error is retryable
    ///
    /// Transient classes only; permanent classes (not-found, unsupported
    /// capability, configuration) must never be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UnihomeError::Network(_) | UnihomeError::RateLimit(_) | UnihomeError::Timeout(_)
        )
    }

    /// Check if error indicates an authentication issue
    pub fn is_auth_error(&self) -> bool {
        matches!(self, UnihomeError::Authentication(_))
    }

    /// The serializable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            UnihomeError::Authentication(_) => ErrorKind::Authentication,
            UnihomeError::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            UnihomeError::Network(_) => ErrorKind::Network,
            UnihomeError::RateLimit(_) => ErrorKind::RateLimit,
            UnihomeError::Timeout(_) => ErrorKind::Timeout,
            UnihomeError::CommandExecution(_) => ErrorKind::CommandExecution,
            UnihomeError::Configuration(_) => ErrorKind::Configuration,
            UnihomeError::CapabilityNotSupported(_) => ErrorKind::CapabilityNotSupported,
        }
    }
}

impl From<reqwest::Error> for UnihomeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UnihomeError::Timeout(format!("HTTP request timed out: {err}"))
        } else if let Some(status) = err.status() {
            UnihomeError::from_status(status.as_u16(), err.to_string())
        } else {
            UnihomeError::Network(format!("HTTP request failed: {err}"))
        }
    }
}

impl From<serde_json::Error> for UnihomeError {
    fn from(err: serde_json::Error) -> Self {
        UnihomeError::CommandExecution(format!("response parsing failed: {err}"))
    }
}
