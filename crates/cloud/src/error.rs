// Cloud client errors

use autoads_core::{BusError, SecretError, UpstreamError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("HTTP error ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("access token unavailable: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for CloudError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CloudError::Timeout
        } else if e.is_decode() {
            CloudError::Decode(e.to_string())
        } else {
            CloudError::Transport(e.to_string())
        }
    }
}

impl From<CloudError> for UpstreamError {
    fn from(e: CloudError) -> Self {
        match e {
            CloudError::Http { status, message } => UpstreamError::Http { status, message },
            CloudError::NotFound(message) => UpstreamError::Http {
                status: 404,
                message,
            },
            CloudError::Transport(message) | CloudError::Auth(message) => {
                UpstreamError::Transport(message)
            }
            CloudError::Timeout => UpstreamError::Timeout,
            CloudError::Decode(message) => UpstreamError::Decode(message),
            CloudError::NotConfigured(message) => UpstreamError::NotConfigured(message),
        }
    }
}

impl From<CloudError> for SecretError {
    fn from(e: CloudError) -> Self {
        match e {
            CloudError::NotFound(name) => SecretError::NotFound(name),
            CloudError::NotConfigured(message) | CloudError::Auth(message) => {
                SecretError::Client(message)
            }
            other => SecretError::Access(other.to_string()),
        }
    }
}

impl From<CloudError> for BusError {
    fn from(e: CloudError) -> Self {
        BusError::Publish(e.to_string())
    }
}

/// Turn a non-success response into an error carrying its body
pub(crate) async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, CloudError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(CloudError::NotFound(what.to_string()));
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(CloudError::Http {
        status: status.as_u16(),
        message,
    })
}
