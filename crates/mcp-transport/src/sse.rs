//! Legacy HTTP+SSE transport (protocol version 2024-11-05): a long-lived GET
//! for server→client traffic, whose first event discovers the POST endpoint
//! used for client→server messages.

use crate::error::{TransportError, TransportResult};
use crate::transport::{ConnectedTransport, Transport, TransportCapabilities, TransportKind};
use async_trait::async_trait;
use futures::StreamExt;
use mcp_protocol::jsonrpc::JsonRpcMessage;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};
use url::Url;

pub struct SseTransport {
    base_url: Url,
    client: Client,
    connection_timeout: Duration,
    connected: bool,
    message_endpoint: Arc<Mutex<Option<Url>>>,
}

impl SseTransport {
    pub fn new(endpoint: &str, connection_timeout: Duration) -> TransportResult<Self> {
        Ok(Self {
            base_url: Url::parse(endpoint)?,
            client: Client::new(),
            connection_timeout,
            connected: false,
            message_endpoint: Arc::new(Mutex::new(None)),
        })
    }

    fn sse_url(&self) -> Url {
        let mut url = self.base_url.clone();
        // `/sse` is appended unless the configured endpoint already ends in it.
        if !url.path().ends_with("/sse") {
            let mut path = url.path().trim_end_matches('/').to_string();
            path.push_str("/sse");
            url.set_path(&path);
        }
        url
    }
}

/// One parsed `event:`/`data:` SSE frame. Unknown field lines are ignored,
/// matching the spec's "other event names are ignored" rule at a finer
/// grain — we still hand back whatever the server labelled the event.
#[derive(Debug, Default, Clone)]
struct SseEvent {
    event: Option<String>,
    data: String,
}

fn parse_sse_frame(raw: &str) -> SseEvent {
    let mut event = SseEvent::default();
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event.event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        }
    }
    event.data = data_lines.join("\n");
    event
}

#[async_trait]
impl Transport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            streaming: true,
            bidirectional: true,
            server_initiated_messages: true,
            persistent: true,
        }
    }

    async fn connect(&mut self) -> TransportResult<ConnectedTransport> {
        let response = self
            .client
            .get(self.sse_url())
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::HttpStatus {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<JsonRpcMessage>();
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<Url>();
        let base_url = self.base_url.clone();
        let message_endpoint = Arc::clone(&self.message_endpoint);

        tokio::spawn(async move {
            let mut endpoint_tx = Some(endpoint_tx);
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { break };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find("\n\n") {
                    let frame = buffer[..pos].to_string();
                    buffer.drain(..pos + 2);
                    let event = parse_sse_frame(&frame);

                    match event.event.as_deref() {
                        Some("endpoint") => {
                            let resolved = base_url.join(event.data.trim()).unwrap_or_else(|_| base_url.clone());
                            *message_endpoint.lock().await = Some(resolved.clone());
                            if let Some(tx) = endpoint_tx.take() {
                                let _ = tx.send(resolved);
                            }
                        }
                        Some("message") | None => {
                            if event.data.is_empty() {
                                continue;
                            }
                            match JsonRpcMessage::from_slice(event.data.as_bytes()) {
                                Ok(message) => {
                                    if inbound_tx.send(message).is_err() {
                                        return;
                                    }
                                }
                                Err(e) => warn!("dropping malformed SSE message event: {e}"),
                            }
                        }
                        Some(other) => debug!(event = other, "ignoring unrecognized SSE event"),
                    }
                }
            }
            debug!("SSE stream ended");
        });

        let discovered = tokio::time::timeout(self.connection_timeout, endpoint_rx)
            .await
            .map_err(|_| TransportError::Timeout(self.connection_timeout))?
            .map_err(|_| TransportError::ConnectionFailed("SSE stream closed before endpoint event".into()))?;

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<JsonRpcMessage>();
        let client = self.client.clone();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let body = match serde_json::to_vec(&message) {
                    Ok(b) => b,
                    Err(e) => {
                        warn!("failed to serialize outbound SSE message: {e}");
                        continue;
                    }
                };
                if let Err(e) = client.post(discovered.clone()).header("Content-Type", "application/json").body(body).send().await {
                    warn!("POST to SSE message endpoint failed: {e}");
                }
            }
        });

        self.connected = true;
        Ok(ConnectedTransport { outbound_tx, inbound_rx, session_id: None, error_rx: None })
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        self.connected = false;
        *self.message_endpoint.lock().await = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_endpoint_event() {
        let frame = "event: endpoint\ndata: /messages?session=abc";
        let event = parse_sse_frame(frame);
        assert_eq!(event.event.as_deref(), Some("endpoint"));
        assert_eq!(event.data, "/messages?session=abc");
    }

    #[test]
    fn parses_multiline_message_data() {
        let frame = "event: message\ndata: {\"jsonrpc\":\"2.0\",\ndata: \"id\":1}";
        let event = parse_sse_frame(frame);
        assert_eq!(event.data, "{\"jsonrpc\":\"2.0\",\n\"id\":1}");
    }

    #[test]
    fn sse_url_appends_path_once() {
        let transport = SseTransport::new("http://localhost:8080/mcp", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.sse_url().path(), "/mcp/sse");
    }
}
