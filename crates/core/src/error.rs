// Error taxonomy shared by every service
//
// ErrorCode is the wire-level kind rendered in the unified error body.
// StoreError is what every storage backend returns; services map it to a code.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error kinds rendered as `error.code` in the unified error body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    Unauthorized,
    Forbidden,
    NotFound,
    AlreadyExists,
    Conflict,
    MethodNotAllowed,
    Upstream,
    RateLimited,
    NotReady,
    Internal,
    // Specializations
    ServerNotConfigured,
    SecretAccess,
    SecretClient,
    QueryFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorCode::Upstream => "UPSTREAM",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::NotReady => "NOT_READY",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::ServerNotConfigured => "SERVER_NOT_CONFIGURED",
            ErrorCode::SecretAccess => "SECRET_ACCESS",
            ErrorCode::SecretClient => "SECRET_CLIENT",
            ErrorCode::QueryFailed => "QUERY_FAILED",
        }
    }

    /// HTTP status for this kind
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidArgument => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::MethodNotAllowed => 405,
            ErrorCode::AlreadyExists | ErrorCode::Conflict => 409,
            ErrorCode::RateLimited => 429,
            ErrorCode::Upstream => 502,
            ErrorCode::NotReady
            | ErrorCode::Internal
            | ErrorCode::ServerNotConfigured
            | ErrorCode::SecretAccess
            | ErrorCode::SecretClient
            | ErrorCode::QueryFailed => 500,
        }
    }

    /// Reverse mapping used for the metrics status label
    pub fn from_http_status(status: u16) -> Option<Self> {
        match status {
            200..=399 => None,
            400 => Some(ErrorCode::InvalidArgument),
            401 => Some(ErrorCode::Unauthorized),
            403 => Some(ErrorCode::Forbidden),
            404 => Some(ErrorCode::NotFound),
            405 => Some(ErrorCode::MethodNotAllowed),
            409 => Some(ErrorCode::AlreadyExists),
            429 => Some(ErrorCode::RateLimited),
            502..=504 => Some(ErrorCode::Upstream),
            400..=499 => Some(ErrorCode::InvalidArgument),
            _ => Some(ErrorCode::Internal),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique constraint violated
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Write rejected by a domain precondition (e.g. insufficient balance)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Referenced table does not exist (tolerated by aggregate readouts)
    #[error("missing table: {0}")]
    MissingTable(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::NotFound(_) => ErrorCode::NotFound,
            StoreError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            StoreError::Conflict(_) => ErrorCode::Conflict,
            StoreError::MissingTable(_) | StoreError::Database(_) => ErrorCode::QueryFailed,
            StoreError::Serialization(_) => ErrorCode::Internal,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Error type for event bus operations
#[derive(Debug, Error)]
pub enum BusError {
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("encoding failed: {0}")]
    Encoding(String),
}

/// Error type for secret store access
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("secret access failed: {0}")]
    Access(String),

    /// Client could not be built (missing project, credentials)
    #[error("secret client unavailable: {0}")]
    Client(String),
}

impl SecretError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SecretError::NotFound(_) | SecretError::Access(_) => ErrorCode::SecretAccess,
            SecretError::Client(_) => ErrorCode::SecretClient,
        }
    }
}

/// Error type for outbound calls to HTTP collaborators
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("upstream timed out")]
    Timeout,

    #[error("upstream response could not be decoded: {0}")]
    Decode(String),

    #[error("upstream not configured: {0}")]
    NotConfigured(String),
}

impl crate::ratelimit::Retryable for UpstreamError {
    fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Http { status, .. } => *status == 429 || *status >= 500,
            UpstreamError::Timeout => true,
            UpstreamError::Transport(message) => crate::ratelimit::is_transient_message(message),
            UpstreamError::Decode(_) | UpstreamError::NotConfigured(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorCode::InvalidArgument.http_status(), 400);
        assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
        assert_eq!(ErrorCode::Forbidden.http_status(), 403);
        assert_eq!(ErrorCode::NotFound.http_status(), 404);
        assert_eq!(ErrorCode::MethodNotAllowed.http_status(), 405);
        assert_eq!(ErrorCode::AlreadyExists.http_status(), 409);
        assert_eq!(ErrorCode::Internal.http_status(), 500);
        assert_eq!(ErrorCode::Upstream.http_status(), 502);
        assert_eq!(ErrorCode::RateLimited.http_status(), 429);
    }

    #[test]
    fn test_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::ServerNotConfigured).unwrap();
        assert_eq!(json, "\"SERVER_NOT_CONFIGURED\"");
        assert_eq!(ErrorCode::NotReady.to_string(), "NOT_READY");
    }

    #[test]
    fn test_reverse_mapping() {
        assert_eq!(ErrorCode::from_http_status(204), None);
        assert_eq!(
            ErrorCode::from_http_status(404),
            Some(ErrorCode::NotFound)
        );
        assert_eq!(
            ErrorCode::from_http_status(418),
            Some(ErrorCode::InvalidArgument)
        );
        assert_eq!(ErrorCode::from_http_status(503), Some(ErrorCode::Upstream));
        assert_eq!(ErrorCode::from_http_status(500), Some(ErrorCode::Internal));
    }

    #[test]
    fn test_upstream_retryable_classes() {
        use crate::ratelimit::Retryable;
        let http = |status| UpstreamError::Http {
            status,
            message: String::new(),
        };
        assert!(http(429).is_retryable());
        assert!(http(503).is_retryable());
        assert!(!http(404).is_retryable());
        assert!(UpstreamError::Timeout.is_retryable());
        assert!(!UpstreamError::Decode("bad json".into()).is_retryable());

        let quoted = UpstreamError::Http {
            status: 404,
            message: "no data for host 500px.com (id 555)".into(),
        };
        assert!(!quoted.is_retryable());
    }

    #[test]
    fn test_store_error_codes() {
        assert_eq!(
            StoreError::AlreadyExists("x".into()).code(),
            ErrorCode::AlreadyExists
        );
        assert_eq!(
            StoreError::Database("boom".into()).code(),
            ErrorCode::QueryFailed
        );
    }
}
