//! Ambient execution context threaded into every handler invocation.
//!
//! Earlier drafts of this runtime flowed session id / capabilities /
//! per-request extras implicitly through thread-local-ish state. That made
//! it impossible to snapshot context per HTTP session, so it is now an
//! explicit value passed by reference to every handler.

use mcp_protocol::initialize::{ClientCapabilities, ServerCapabilities};
use mcp_protocol::version::McpVersion;
use std::collections::HashMap;
use std::sync::Arc;

/// Which side of the connection this context belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub side: Side,
    pub session_id: Option<String>,
    pub protocol_version: McpVersion,
    pub client_capabilities: ClientCapabilities,
    pub server_capabilities: ServerCapabilities,
    /// Set for Streamable HTTP stateless-mode sessions: server→client
    /// requests (sampling/roots/elicitation) and unsolicited notifications
    /// are forbidden regardless of advertised capabilities.
    pub stateless: bool,
    extra: Arc<HashMap<String, serde_json::Value>>,
}

impl SessionContext {
    pub fn new(side: Side, protocol_version: McpVersion) -> Self {
        Self {
            side,
            session_id: None,
            protocol_version,
            client_capabilities: ClientCapabilities::default(),
            server_capabilities: ServerCapabilities::default(),
            stateless: false,
            extra: Arc::new(HashMap::new()),
        }
    }

    pub fn with_extra(mut self, extra: HashMap<String, serde_json::Value>) -> Self {
        self.extra = Arc::new(extra);
        self
    }

    pub fn get_extra(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    /// A snapshot is a cheap clone: the extension bag is reference-counted,
    /// so capturing one context per HTTP session and handing a clone to
    /// every request dispatched in it does not re-allocate per request.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}
