use thiserror::Error;

/// Shared error shape for every external service contract in this crate.
/// Callers match on `kind()` rather than message text so the flow handlers
/// can apply the error-handling taxonomy without string-matching.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transient network failure: {0}")]
    Transient(String),
    #[error("upstream rejected the request: {0}")]
    UpstreamRejected(String),
    #[error("authorization failed: {0}")]
    Auth(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    UpstreamRejected,
    Auth,
    Internal,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Transient(_) => ErrorKind::Transient,
            ServiceError::UpstreamRejected(_) => ErrorKind::UpstreamRejected,
            ServiceError::Auth(_) => ErrorKind::Auth,
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            ServiceError::Auth(body)
        } else if status.is_client_error() {
            ServiceError::UpstreamRejected(body)
        } else {
            ServiceError::Transient(body)
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
