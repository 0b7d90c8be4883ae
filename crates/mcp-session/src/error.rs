//! Session-lifecycle errors, distinct from the wire-format errors in
//! `mcp_protocol::error` and the I/O errors in `mcp_transport::error`.

use mcp_protocol::meta::RequestId;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is not initialized yet")]
    NotInitialized,

    #[error("session was already initialized")]
    AlreadyInitialized,

    #[error("server protocol version {server} is not one this client supports")]
    VersionMismatch { server: String },

    #[error("server capabilities rejected: {0}")]
    CapabilityRejected(String),

    #[error("peer does not advertise the '{0}' capability")]
    CapabilityNotAdvertised(&'static str),

    #[error("operation requires an active session, not stateless mode")]
    StatelessModeForbidden,

    #[error("request {0} was cancelled")]
    Cancelled(RequestId),

    #[error("request {0} timed out")]
    Timeout(RequestId),

    #[error("no handler registered for request id {0}")]
    UnknownRequestId(RequestId),

    #[error("no handler registered for method '{0}'")]
    MethodNotFound(String),

    #[error("a handler is already registered for method '{0}'")]
    DuplicateHandler(String),

    #[error("session is closed")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] mcp_protocol::error::McpError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
