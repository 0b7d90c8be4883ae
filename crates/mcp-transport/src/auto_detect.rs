//! Transport auto-detection: try Streamable HTTP first, fall back to legacy
//! SSE on a non-2xx response to the initial `initialize` POST. Selection is
//! sticky for the session's lifetime.

use crate::config::{HttpTransportConfig, TransportMode};
use crate::error::TransportResult;
use crate::sse::SseTransport;
use crate::streamable_http::StreamableHttpTransport;
use crate::transport::{BoxedTransport, ConnectedTransport, Transport, TransportKind};
use mcp_protocol::jsonrpc::JsonRpcMessage;
use tracing::{info, warn};

pub struct AutoDetectTransport;

impl AutoDetectTransport {
    /// `TransportMode::StreamableHttp`/`Sse` connect directly with no probe.
    /// `TransportMode::AutoDetect` probes Streamable HTTP with `initialize`
    /// and commits to whichever transport answers successfully.
    ///
    /// The probe POST and the real connection's first POST are two separate
    /// requests — a server that rejects a second `initialize` on the same
    /// logical attempt will see this as a retried handshake, not a resumed
    /// one. Acceptable for this probe-then-commit shape; see DESIGN.md.
    pub async fn connect(
        config: &HttpTransportConfig,
        initialize: JsonRpcMessage,
    ) -> TransportResult<(BoxedTransport, ConnectedTransport)> {
        let use_http = match config.mode {
            TransportMode::StreamableHttp => true,
            TransportMode::Sse => false,
            TransportMode::AutoDetect => match StreamableHttpTransport::probe(&config.endpoint, &initialize).await {
                Ok(status) if status.is_success() => true,
                Ok(status) => {
                    info!(%status, "Streamable HTTP probe rejected, falling back to SSE");
                    false
                }
                Err(e) => {
                    warn!("Streamable HTTP probe failed, falling back to SSE: {e}");
                    false
                }
            },
        };

        if use_http {
            let mut transport = StreamableHttpTransport::new(&config.endpoint, config.additional_headers.clone())?;
            let connected = transport.connect().await?;
            connected.outbound_tx.send(initialize).ok();
            Ok((Box::new(transport), connected))
        } else {
            let mut transport = SseTransport::new(&config.endpoint, config.connection_timeout)?;
            let connected = transport.connect().await?;
            connected.outbound_tx.send(initialize).ok();
            Ok((Box::new(transport), connected))
        }
    }

    pub fn kind_for(transport: &BoxedTransport) -> TransportKind {
        transport.kind()
    }
}
