// Service-level errors and their HTTP rendering

use autoads_core::{StoreError, UpstreamError};
use autoads_server::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Store(e) => e.into(),
            ServiceError::Upstream(e) => e.into(),
            ServiceError::InvalidArgument(message) => ApiError::invalid_argument(message),
            ServiceError::NotFound(message) => ApiError::not_found(message),
        }
    }
}
