//! Server-side HTTP transport errors.

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("unknown session id")]
    UnknownSession,

    #[error("a GET stream is already open for this session")]
    GetAlreadyOpen,

    #[error("{0} are not supported in stateless mode.")]
    StatelessModeForbidden(&'static str),

    #[error("Accept header must include application/json and text/event-stream")]
    UnacceptableAccept,

    #[error("Content-Type must be application/json")]
    UnsupportedMediaType,

    #[error("idleTimeout and maxIdleSessionCount must be non-negative")]
    InvalidIdleConfig,

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] http::Error),

    #[error(transparent)]
    Session(#[from] mcp_session::SessionError),
}

pub type HttpServerResult<T> = Result<T, HttpServerError>;
