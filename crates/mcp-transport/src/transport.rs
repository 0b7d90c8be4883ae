//! The `Transport` trait: a session-scoped duplex channel of JSON-RPC
//! messages. Transports know nothing about request correlation — that is
//! `mcp-session`'s job — they only ship frames in and out.

use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use mcp_protocol::jsonrpc::JsonRpcMessage;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Sse,
    StreamableHttp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::Sse => write!(f, "SSE"),
            TransportKind::StreamableHttp => write!(f, "Streamable HTTP"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransportCapabilities {
    pub streaming: bool,
    pub bidirectional: bool,
    pub server_initiated_messages: bool,
    pub persistent: bool,
}

/// The live ends of a connected transport: a sink the session writes
/// outbound frames to, and a source the session's message loop reads
/// inbound frames from. `session_id`, when present, is whatever the peer
/// assigned during `initialize` (Streamable HTTP only). `error_rx`, when
/// present, carries transport-fatal conditions that can't be expressed as a
/// `JsonRpcMessage` (e.g. a child process exiting unexpectedly) — a caller
/// that only watches `inbound_rx` sees an ordinary closed channel instead.
pub struct ConnectedTransport {
    pub outbound_tx: mpsc::UnboundedSender<JsonRpcMessage>,
    pub inbound_rx: mpsc::UnboundedReceiver<JsonRpcMessage>,
    pub session_id: Option<String>,
    pub error_rx: Option<mpsc::UnboundedReceiver<TransportError>>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn capabilities(&self) -> TransportCapabilities;

    /// Establishes the connection and returns the duplex channel pair. May
    /// only be called once per transport instance.
    async fn connect(&mut self) -> TransportResult<ConnectedTransport>;

    /// Gracefully tears down the connection (closes the child process /
    /// HTTP session / SSE stream). Idempotent.
    async fn disconnect(&mut self) -> TransportResult<()>;

    fn is_connected(&self) -> bool;

    /// A cheap, transport-level liveness check — not a round-trip `ping`
    /// (this layer has no request/response correlation, that's `Session`'s
    /// job), just "is the underlying connection still usable". The default
    /// answers from `is_connected()`; transports that can detect a dead peer
    /// without a round trip (e.g. a child process that already exited)
    /// override it.
    async fn health_check(&self) -> TransportResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

pub type BoxedTransport = Box<dyn Transport>;
