// Service-level errors and their HTTP rendering

use autoads_core::ratelimit::RateLimitError;
use autoads_core::{StoreError, UpstreamError};
use autoads_server::ApiError;
use autoads_storage::CustodyError;
use serde_json::json;
use thiserror::Error;

use crate::ads::AdsError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Ads(#[from] AdsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    NotConfigured(String),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InvalidArgument(message.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Ads(e) => e.into(),
            ServiceError::Store(e) => e.into(),
            ServiceError::Custody(CustodyError::Store(e)) => e.into(),
            ServiceError::Custody(e) => {
                tracing::error!("Refresh token custody failed: {}", e);
                ApiError::internal(e)
            }
            ServiceError::Upstream(e) => e.into(),
            ServiceError::RateLimit(RateLimitError::QuotaExceeded { limit, used }) => {
                ApiError::rate_limited("Daily request quota exceeded")
                    .with_details(json!({ "limit": limit, "used": used }))
            }
            ServiceError::RateLimit(e) => ApiError::rate_limited(e.to_string()),
            ServiceError::InvalidArgument(message) => ApiError::invalid_argument(message),
            ServiceError::NotFound(message) => ApiError::not_found(message),
            ServiceError::NotConfigured(message) => ApiError::not_configured(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoads_core::ErrorCode;

    #[test]
    fn test_quota_exceeded_carries_usage() {
        let e: ApiError = ServiceError::RateLimit(RateLimitError::QuotaExceeded {
            limit: 200,
            used: 200,
        })
        .into();
        assert_eq!(e.code, ErrorCode::RateLimited);
        assert_eq!(e.details.unwrap()["limit"], 200);
    }

    #[test]
    fn test_not_connected_is_invalid_argument() {
        let e: ApiError = ServiceError::Ads(AdsError::NotConnected).into();
        assert_eq!(e.code, ErrorCode::InvalidArgument);
    }
}
