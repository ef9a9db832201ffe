//! Error types for the BRS API client.

use crate::marks::portal::ServiceError;

#[derive(Debug, thiserror::Error)]
pub enum BrsApiError {
    #[error("BRS session is invalid or expired: {0}")]
    InvalidSession(String),
    #[error("BRS is unavailable")]
    Unavailable(#[source] anyhow::Error),
    #[error("Failed to parse response")]
    ParseFailed {
        status: u16,
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    RequestFailed(#[from] anyhow::Error),
}

impl From<BrsApiError> for ServiceError {
    fn from(e: BrsApiError) -> Self {
        match e {
            BrsApiError::InvalidSession(msg) => ServiceError::SessionExpired(msg),
            BrsApiError::Unavailable(source) => ServiceError::Unavailable(source),
            other @ (BrsApiError::ParseFailed { .. } | BrsApiError::RequestFailed(_)) => {
                ServiceError::Failed(anyhow::Error::new(other))
            }
        }
    }
}

impl From<reqwest_middleware::Error> for BrsApiError {
    fn from(e: reqwest_middleware::Error) -> Self {
        match e {
            reqwest_middleware::Error::Reqwest(e) if e.is_connect() || e.is_timeout() => {
                BrsApiError::Unavailable(e.into())
            }
            reqwest_middleware::Error::Reqwest(e) => BrsApiError::RequestFailed(e.into()),
            reqwest_middleware::Error::Middleware(e) => BrsApiError::RequestFailed(e),
        }
    }
}
