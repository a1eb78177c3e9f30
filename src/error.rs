use std::error::Error;
use std::fmt;

use warp::http::StatusCode;

#[derive(Debug)]
pub enum HostError {
    // Client errors
    ValidationError(String),
    Conflict(String),

    // Auth errors
    Unauthorized,
    Forbidden,

    // Lookup errors
    NotFound,
    Gone,

    // Platform errors
    NotImplemented(String),

    // Request lifetime
    Cancelled,

    // Internal errors
    StorageError(String),
    CryptoError(String),
    SystemError(String),

    // Contract violations
    InvalidArgument(String),

    // Configuration errors
    ConfigError(String),
}

impl HostError {
    /// HTTP status surfaced to the client for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Gone => StatusCode::GONE,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::StorageError(_)
            | Self::CryptoError(_)
            | Self::SystemError(_)
            | Self::InvalidArgument(_)
            | Self::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the client, if any
    pub fn client_message(&self) -> Option<String> {
        match self {
            Self::ValidationError(msg) | Self::Conflict(msg) => Some(msg.clone()),
            Self::NotImplemented(msg) => Some(msg.clone()),
            Self::Cancelled => Some("Request cancelled".to_string()),
            Self::StorageError(_)
            | Self::CryptoError(_)
            | Self::SystemError(_)
            | Self::InvalidArgument(_)
            | Self::ConfigError(_) => Some("Internal server error".to_string()),
            Self::Unauthorized | Self::Forbidden | Self::NotFound | Self::Gone => None,
        }
    }

    /// Whether this is an unexpected failure that should be logged at error level
    pub fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Self::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Self::Unauthorized => write!(f, "Unauthorized access"),
            Self::Forbidden => write!(f, "Forbidden: insufficient permissions"),
            Self::NotFound => write!(f, "Not found"),
            Self::Gone => write!(f, "Gone: the requested system account no longer exists"),
            Self::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Self::CryptoError(msg) => write!(f, "Cryptography error: {}", msg),
            Self::SystemError(msg) => write!(f, "System error: {}", msg),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for HostError {}

impl warp::reject::Reject for HostError {}

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        HostError::SystemError(format!("I/O failure: {}", err))
    }
}

// Generic result type for the host
pub type Result<T> = std::result::Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_errors_hide_details() {
        let err = HostError::StorageError("connection refused to 10.0.0.3".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_internal());
        assert_eq!(err.client_message().as_deref(), Some("Internal server error"));
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = HostError::ValidationError("Username must not contain colons!".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message().as_deref(), Some("Username must not contain colons!"));
    }

    #[test]
    fn test_forbidden_has_no_detail() {
        assert_eq!(HostError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert!(HostError::Forbidden.client_message().is_none());
    }

    #[test]
    fn test_platform_outcomes_are_distinct() {
        assert_eq!(HostError::Gone.status_code(), StatusCode::GONE);
        assert_eq!(
            HostError::NotImplemented("no OS accounts".to_string()).status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
    }
}
