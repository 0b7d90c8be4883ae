//! Header parsing and validation shared by the POST/GET/DELETE handlers.

use crate::error::HttpServerError;
use http::{HeaderMap, HeaderValue};
use mcp_protocol::version::McpVersion;

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Parsed, validated request context common to every Streamable HTTP
/// endpoint: the caller's negotiated (or not-yet-negotiated) session id and
/// protocol version.
#[derive(Debug, Clone)]
pub struct StreamableHttpContext {
    pub session_id: Option<String>,
    pub protocol_version: Option<McpVersion>,
}

impl StreamableHttpContext {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, HttpServerError> {
        let session_id = headers.get(SESSION_ID_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string);

        let protocol_version = match headers.get(PROTOCOL_VERSION_HEADER).and_then(|v| v.to_str().ok()) {
            Some(raw) if McpVersion::is_supported(raw) => {
                Some(raw.parse::<McpVersion>().expect("checked by is_supported"))
            }
            Some(_unsupported) => None,
            None => None,
        };

        Ok(Self { session_id, protocol_version })
    }

    pub fn response_headers(&self, session_id: &str, version: McpVersion) -> Vec<(&'static str, HeaderValue)> {
        vec![
            (SESSION_ID_HEADER, HeaderValue::from_str(session_id).unwrap()),
            (PROTOCOL_VERSION_HEADER, HeaderValue::from_str(version.as_str()).unwrap()),
        ]
    }
}

/// Validates the `Accept` header per the spec: it must list both
/// `application/json` and `text/event-stream` (a bare `*/*` satisfies both).
pub fn validate_accept(headers: &HeaderMap) -> Result<(), HttpServerError> {
    let accept = headers.get(http::header::ACCEPT).and_then(|v| v.to_str().ok()).unwrap_or("");
    if accept.contains("*/*") || (accept.contains("application/json") && accept.contains("text/event-stream")) {
        Ok(())
    } else {
        Err(HttpServerError::UnacceptableAccept)
    }
}

pub fn validate_json_content_type(headers: &HeaderMap) -> Result<(), HttpServerError> {
    let content_type = headers.get(http::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or("");
    if content_type.starts_with("application/json") {
        Ok(())
    } else {
        Err(HttpServerError::UnsupportedMediaType)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;

    #[test]
    fn accepts_wildcard() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::ACCEPT, HeaderValue::from_static("*/*"));
        assert!(validate_accept(&headers).is_ok());
    }

    #[test]
    fn rejects_json_only_accept() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(validate_accept(&headers).is_err());
    }

    #[test]
    fn unsupported_protocol_version_header_is_ignored_not_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(PROTOCOL_VERSION_HEADER, HeaderValue::from_static("1999-01-01"));
        let ctx = StreamableHttpContext::from_headers(&headers).unwrap();
        assert!(ctx.protocol_version.is_none());
    }
}
