//! Transport-level error taxonomy.

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    ConnectionFailed(String),

    #[error("transport is not connected")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("malformed frame: {0}")]
    Framing(String),

    #[error("child process exited with {code:?}; stderr tail:\n{stderr_tail}")]
    ProcessExited { code: Option<i32>, stderr_tail: String },

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
}

impl TransportError {
    /// Whether a caller could reasonably retry the operation that produced
    /// this error (as opposed to a permanent misconfiguration).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionFailed(_)
                | TransportError::Io(_)
                | TransportError::Http(_)
                | TransportError::Timeout(_)
                | TransportError::HttpStatus { status: 500..=599, .. }
        )
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
