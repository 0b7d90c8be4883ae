//! JSON-RPC error codes and the typed error object carried in an `Error`
//! message.

use serde::{Deserialize, Serialize};

/// Standard JSON-RPC 2.0 codes plus the handful MCP reuses. MCP does not
/// reserve any new codes of its own.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// The `error` field of a JSON-RPC error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(error_codes::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message.into())
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message.into())
    }
}

/// Errors produced while building or interpreting MCP protocol values —
/// distinct from transport-level failures (see `mcp-transport::error`) and
/// from session-lifecycle failures (see `mcp-session::error`).
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("malformed JSON-RPC message: {0}")]
    Malformed(String),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("peer error {code}: {message}")]
    Peer { code: i64, message: String, data: Option<serde_json::Value> },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<JsonRpcErrorObject> for McpError {
    fn from(e: JsonRpcErrorObject) -> Self {
        McpError::Peer { code: e.code, message: e.message, data: e.data }
    }
}

pub type McpResult<T> = Result<T, McpError>;
