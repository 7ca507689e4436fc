//! # Client Error Types
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Backend             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Network        │  │  Unauthorized (401)     │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  Http { status }        │ │
//! │  │  ConfigLoad/Save│  │                 │  │  Decode                 │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Session      │  │    Domain       │                              │
//! │  │                 │  │                 │                              │
//! │  │  NotAuthenticated│ │  Core (bill,    │                              │
//! │  │  Storage        │  │  validation)    │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The session bootstrap branches on [`ClientError::is_unauthorized`]: a
//! 401 probe is the only failure that earns a refresh attempt.

use shopbill_core::{CoreError, ValidationError};
use shopbill_store::StoreError;
use thiserror::Error;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Backend could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded its deadline.
    #[error("Request timed out")]
    Timeout,

    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// 401 from the backend.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other non-2xx response.
    #[error("Backend returned {status}: {message}")]
    Http { status: u16, message: String },

    /// 2xx response whose body did not match the expected shape.
    #[error("Unexpected response body: {0}")]
    Decode(String),

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// No usable access token is stored.
    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Session storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Domain Errors
    // =========================================================================
    #[error(transparent)]
    Core(#[from] CoreError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for ClientError {
    fn from(err: ValidationError) -> Self {
        ClientError::Core(CoreError::Validation(err))
    }
}

impl From<StoreError> for ClientError {
    fn from(err: StoreError) -> Self {
        ClientError::Storage(err.to_string())
    }
}

/// ```text
/// timeout           → Timeout
/// connect / request → Network
/// body decode       → Decode
/// status            → Unauthorized / Http
/// ```
impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::from_status(status.as_u16(), err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ClientError {
    fn from(err: toml::ser::Error) -> Self {
        ClientError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl ClientError {
    /// Classifies a non-2xx status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 401 {
            ClientError::Unauthorized(message)
        } else {
            ClientError::Http { status, message }
        }
    }

    /// True for a 401 from the backend.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized(_))
    }

    /// True if repeating the request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::Timeout => true,
            ClientError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidConfig(_)
                | ClientError::InvalidUrl(_)
                | ClientError::ConfigLoadFailed(_)
                | ClientError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ClientError::from_status(401, "expired").is_unauthorized());
        assert!(!ClientError::from_status(403, "forbidden").is_unauthorized());
        assert!(matches!(
            ClientError::from_status(404, "missing"),
            ClientError::Http { status: 404, .. }
        ));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::Network("refused".into()).is_retryable());
        assert!(ClientError::from_status(503, "down").is_retryable());

        assert!(!ClientError::from_status(400, "bad").is_retryable());
        assert!(!ClientError::Unauthorized("no".into()).is_retryable());
        assert!(!ClientError::NotAuthenticated.is_retryable());
    }

    #[test]
    fn test_domain_errors_convert() {
        let err: ClientError = ValidationError::Required { field: "name".into() }.into();
        assert_eq!(err.to_string(), "name is required");
        assert!(!err.is_config_error());
        assert!(ClientError::InvalidUrl("x".into()).is_config_error());
    }
}
