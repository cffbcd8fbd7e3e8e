//! Error types for the agent runtime
//!
//! This module defines the error types shared by the broker, stores, memory
//! modules, providers and the agent loop. Uses `thiserror` for `Display` and
//! `Error` implementations.
//!
//! Every error can be classified as transient or permanent through
//! [`VosError::is_transient`]. The agent loop uses that classification to
//! decide between requeueing and dead-lettering a notification.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured provider error classification.
///
/// Fine-grained categorization of LLM and embedding HTTP errors so retry
/// decisions never depend on string matching.
#[derive(Debug)]
pub enum ProviderError {
    /// 401 / 403 - Invalid API key or authentication failure
    Auth(String),
    /// 429 - Rate limit or quota exceeded
    RateLimit(String),
    /// 402 - Payment required or billing issue
    Billing(String),
    /// 500/502/504 - Server-side errors
    ServerError(String),
    /// 400 - Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 404 - Model not found or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// 503 / 529 - Provider is overloaded
    Overloaded(String),
    /// Response body did not match the expected format
    Format(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::Billing(msg) => write!(f, "Billing error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Overloaded(msg) => write!(f, "Overloaded error: {}", msg),
            ProviderError::Format(msg) => write!(f, "Format error: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Classify an HTTP status code and response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let msg = body.to_string();
        match status {
            401 | 403 => ProviderError::Auth(msg),
            402 => ProviderError::Billing(msg),
            400 | 422 => ProviderError::InvalidRequest(msg),
            404 => ProviderError::ModelNotFound(msg),
            408 => ProviderError::Timeout(msg),
            429 => ProviderError::RateLimit(msg),
            503 | 529 => ProviderError::Overloaded(msg),
            500..=599 => ProviderError::ServerError(msg),
            _ => ProviderError::Unknown(msg),
        }
    }

    /// Returns `true` if this error is transient and the request should be retried.
    ///
    /// Retryable errors: RateLimit, ServerError, Timeout, Overloaded.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_)
                | ProviderError::ServerError(_)
                | ProviderError::Timeout(_)
                | ProviderError::Overloaded(_)
        )
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::Billing(_) => Some(402),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::Overloaded(_) => Some(503),
            ProviderError::Format(_) => Some(400),
            ProviderError::Timeout(_) | ProviderError::Unknown(_) => None,
        }
    }
}

impl From<ProviderError> for VosError {
    fn from(err: ProviderError) -> Self {
        VosError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// Keywords that mark an untyped error message as a transient infrastructure failure.
const TRANSIENT_KEYWORDS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "network",
    "temporary",
    "unavailable",
    "rate limit",
];

/// The primary error type for runtime operations.
#[derive(Error, Debug)]
pub enum VosError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped provider errors
    #[error("Provider error: {0}")]
    Provider(String),

    /// Structured provider error with classification for retry decisions.
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// Broker failures (connection lost, queue closed, unknown delivery)
    #[error("Broker error: {0}")]
    Broker(String),

    /// Persistent store failures (status, metadata, history)
    #[error("Store error: {0}")]
    Store(String),

    /// Tool execution errors raised by handlers
    #[error("Tool error: {0}")]
    Tool(String),

    /// Vector store or embedding failures
    #[error("Memory error: {0}")]
    Memory(String),

    /// A notification body that cannot be decoded or is misaddressed
    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    /// Input rejected by validation (memory fields, tool arguments, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found (tools, memories, agents, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The runtime is shutting down
    #[error("Shutdown in progress")]
    Shutdown,
}

impl VosError {
    /// Returns `true` for infrastructure failures worth retrying.
    ///
    /// Broker, store and I/O failures are always transient. Provider errors
    /// defer to [`ProviderError::is_retryable`]. Untyped messages are matched
    /// against a small keyword list.
    pub fn is_transient(&self) -> bool {
        match self {
            VosError::Broker(_) | VosError::Store(_) | VosError::Io(_) => true,
            VosError::ProviderTyped(pe) => pe.is_retryable(),
            VosError::Http(e) => e.is_timeout() || e.is_connect(),
            VosError::Provider(msg) | VosError::Memory(msg) | VosError::Tool(msg) => {
                let lower = msg.to_lowercase();
                TRANSIENT_KEYWORDS.iter().any(|kw| lower.contains(kw))
            }
            VosError::Config(_)
            | VosError::MalformedNotification(_)
            | VosError::Validation(_)
            | VosError::NotFound(_)
            | VosError::Json(_)
            | VosError::Shutdown => false,
        }
    }
}

/// A specialized `Result` type for runtime operations.
pub type Result<T> = std::result::Result<T, VosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VosError::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VosError = io_err.into();
        assert!(matches!(err, VosError::Io(_)));
    }

    #[test]
    fn test_infrastructure_errors_are_transient() {
        assert!(VosError::Broker("connection reset".into()).is_transient());
        assert!(VosError::Store("database locked".into()).is_transient());
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert!(VosError::from(io_err).is_transient());
    }

    #[test]
    fn test_input_errors_are_permanent() {
        assert!(!VosError::MalformedNotification("bad json".into()).is_transient());
        assert!(!VosError::Validation("importance".into()).is_transient());
        assert!(!VosError::NotFound("tool".into()).is_transient());
        assert!(!VosError::Config("x".into()).is_transient());
        assert!(!VosError::Shutdown.is_transient());
    }

    #[test]
    fn test_untyped_messages_use_keywords() {
        assert!(VosError::Provider("Request timed out".into()).is_transient());
        assert!(VosError::Memory("vector service unavailable".into()).is_transient());
        assert!(VosError::Tool("Network unreachable".into()).is_transient());
        assert!(!VosError::Provider("invalid model".into()).is_transient());
    }

    #[test]
    fn test_provider_typed_transient_follows_retryable() {
        assert!(VosError::from(ProviderError::RateLimit("slow down".into())).is_transient());
        assert!(!VosError::from(ProviderError::Auth("bad key".into())).is_transient());
    }

    #[test]
    fn test_provider_error_from_status() {
        assert!(matches!(
            ProviderError::from_status(401, "x"),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(429, "x"),
            ProviderError::RateLimit(_)
        ));
        assert!(matches!(
            ProviderError::from_status(503, "x"),
            ProviderError::Overloaded(_)
        ));
        assert!(matches!(
            ProviderError::from_status(502, "x"),
            ProviderError::ServerError(_)
        ));
        assert!(matches!(
            ProviderError::from_status(404, "x"),
            ProviderError::ModelNotFound(_)
        ));
        assert!(matches!(
            ProviderError::from_status(418, "x"),
            ProviderError::Unknown(_)
        ));
    }

    #[test]
    fn test_provider_error_is_retryable() {
        assert!(ProviderError::RateLimit("429".into()).is_retryable());
        assert!(ProviderError::ServerError("500".into()).is_retryable());
        assert!(ProviderError::Timeout("timeout".into()).is_retryable());
        assert!(ProviderError::Overloaded("busy".into()).is_retryable());

        assert!(!ProviderError::Auth("401".into()).is_retryable());
        assert!(!ProviderError::Billing("402".into()).is_retryable());
        assert!(!ProviderError::InvalidRequest("400".into()).is_retryable());
        assert!(!ProviderError::ModelNotFound("404".into()).is_retryable());
        assert!(!ProviderError::Format("bad".into()).is_retryable());
        assert!(!ProviderError::Unknown("???".into()).is_retryable());
    }

    #[test]
    fn test_provider_error_status_code() {
        assert_eq!(ProviderError::Auth("x".into()).status_code(), Some(401));
        assert_eq!(ProviderError::RateLimit("x".into()).status_code(), Some(429));
        assert_eq!(ProviderError::Overloaded("x".into()).status_code(), Some(503));
        assert_eq!(ProviderError::Timeout("x".into()).status_code(), None);
    }

    #[test]
    fn test_provider_typed_display() {
        let err = VosError::ProviderTyped(ProviderError::Auth("invalid key".into()));
        assert_eq!(
            err.to_string(),
            "Provider error: Authentication error: invalid key"
        );
    }
}
