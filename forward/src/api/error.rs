use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Retryable status still returned after the last attempt
    #[error("received status {0}")]
    RetriesExhausted(u16),

    #[error("unexpected status {status} {action}: {body}")]
    UnexpectedStatus {
        status: u16,
        action: String,
        body: String,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("decode {what}: {message}")]
    ParseError { what: String, message: String },

    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    /// True when the remote object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApiError::NotFound(_) | ApiError::UnexpectedStatus { status: 404, .. }
        )
    }

    pub(crate) fn missing(what: &str) -> Self {
        ApiError::InvalidArgument(format!("{} must be provided", what))
    }
}
