use thiserror::Error;

use crate::gate::GateError;

/// Failure of the underlying HTTP transport. Passed through untouched.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP transport failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport failed: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }
}

/// Everything that can go wrong while a session performs a request.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The caller's request factory failed; the error is kept as returned.
    #[error("request factory failed: {0:#}")]
    Factory(anyhow::Error),

    #[error("request canceled")]
    Canceled,

    #[error("admission gate is closed")]
    Closed,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to decode response body: {0}")]
    Decode(#[source] std::io::Error),
}

impl From<GateError> for SessionError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Closed => SessionError::Closed,
            GateError::Canceled => SessionError::Canceled,
        }
    }
}

impl SessionError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, SessionError::Canceled)
    }
}
