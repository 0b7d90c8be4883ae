//! Streamable HTTP transport (protocol version 2025-03-26+): a single POST
//! endpoint whose response may be a plain JSON body, an SSE stream, or a
//! bare 202, plus an optional long-lived GET for unsolicited server→client
//! traffic.

use crate::error::{TransportError, TransportResult};
use crate::transport::{ConnectedTransport, Transport, TransportCapabilities, TransportKind};
use async_trait::async_trait;
use futures::StreamExt;
use mcp_protocol::jsonrpc::JsonRpcMessage;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

const SESSION_ID_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

#[derive(Clone)]
struct NegotiatedState {
    session_id: Arc<Mutex<Option<String>>>,
    protocol_version: Arc<Mutex<Option<String>>>,
}

impl NegotiatedState {
    fn new() -> Self {
        Self { session_id: Arc::new(Mutex::new(None)), protocol_version: Arc::new(Mutex::new(None)) }
    }
}

pub struct StreamableHttpTransport {
    endpoint: Url,
    client: Client,
    additional_headers: HashMap<String, String>,
    state: NegotiatedState,
    connected: bool,
}

impl StreamableHttpTransport {
    pub fn new(endpoint: &str, additional_headers: HashMap<String, String>) -> TransportResult<Self> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            client: Client::new(),
            additional_headers,
            state: NegotiatedState::new(),
            connected: false,
        })
    }

    pub fn session_id(&self) -> Option<String> {
        self.state.session_id.lock().clone()
    }

    pub fn protocol_version(&self) -> Option<String> {
        self.state.protocol_version.lock().clone()
    }

    /// A bare POST with the initialize request's response status, used by
    /// [`crate::auto_detect::AutoDetectTransport`] to decide whether to fall
    /// back to SSE before committing to this transport.
    pub async fn probe(endpoint: &str, initialize: &JsonRpcMessage) -> TransportResult<StatusCode> {
        let client = Client::new();
        let url = Url::parse(endpoint)?;
        let response = client
            .post(url)
            .header("Accept", "application/json, text/event-stream")
            .header("Content-Type", "application/json")
            .json(initialize)
            .send()
            .await?;
        Ok(response.status())
    }
}

async fn post_message(
    client: &Client,
    endpoint: &Url,
    headers: &HashMap<String, String>,
    state: &NegotiatedState,
    message: &JsonRpcMessage,
    inbound_tx: &mpsc::UnboundedSender<JsonRpcMessage>,
) -> TransportResult<()> {
    let mut request = client
        .post(endpoint.clone())
        .header("Accept", "application/json, text/event-stream")
        .header("Content-Type", "application/json");

    if let Some(session_id) = state.session_id.lock().clone() {
        request = request.header(SESSION_ID_HEADER, session_id);
    }
    if let Some(version) = state.protocol_version.lock().clone() {
        request = request.header(PROTOCOL_VERSION_HEADER, version);
    }
    for (key, value) in headers {
        request = request.header(key, value);
    }

    let response = request.json(message).send().await?;
    let status = response.status();

    if let Some(session_id) = response.headers().get(SESSION_ID_HEADER) {
        if let Ok(value) = session_id.to_str() {
            *state.session_id.lock() = Some(value.to_string());
        }
    }

    if status == StatusCode::ACCEPTED {
        // Notification accepted; no body to process.
        return Ok(());
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::HttpStatus { status: status.as_u16(), body });
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("text/event-stream") {
        consume_sse_response(response, inbound_tx).await;
    } else {
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(());
        }
        match JsonRpcMessage::from_slice(&bytes) {
            Ok(parsed) => {
                capture_protocol_version(&parsed, state);
                let _ = inbound_tx.send(parsed);
            }
            Err(e) => warn!("dropping malformed Streamable HTTP response body: {e}"),
        }
    }

    Ok(())
}

fn capture_protocol_version(message: &JsonRpcMessage, state: &NegotiatedState) {
    if let JsonRpcMessage::Response(resp) = message {
        if let Some(version) = resp.result.get("protocolVersion").and_then(|v| v.as_str()) {
            *state.protocol_version.lock() = Some(version.to_string());
        }
    }
}

async fn consume_sse_response(response: reqwest::Response, inbound_tx: &mpsc::UnboundedSender<JsonRpcMessage>) {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        buffer.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(pos) = buffer.find("\n\n") {
            let frame = buffer[..pos].to_string();
            buffer.drain(..pos + 2);
            let data: String = frame
                .lines()
                .filter_map(|l| l.strip_prefix("data:"))
                .map(|l| l.trim_start())
                .collect::<Vec<_>>()
                .join("\n");
            if data.is_empty() {
                continue;
            }
            match JsonRpcMessage::from_slice(data.as_bytes()) {
                Ok(message) => {
                    if inbound_tx.send(message).is_err() {
                        return;
                    }
                }
                Err(e) => warn!("dropping malformed SSE frame in Streamable HTTP response: {e}"),
            }
        }
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::StreamableHttp
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            streaming: true,
            bidirectional: true,
            server_initiated_messages: true,
            persistent: false,
        }
    }

    async fn connect(&mut self) -> TransportResult<ConnectedTransport> {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<JsonRpcMessage>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<JsonRpcMessage>();

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let headers = self.additional_headers.clone();
        let state = self.state.clone();
        let get_inbound_tx = inbound_tx.clone();

        tokio::spawn(async move {
            let mut unsolicited_get_started = false;
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = post_message(&client, &endpoint, &headers, &state, &message, &inbound_tx).await {
                    warn!("Streamable HTTP POST failed: {e}");
                    continue;
                }
                if !unsolicited_get_started && state.session_id.lock().is_some() {
                    unsolicited_get_started = true;
                    spawn_unsolicited_get(client.clone(), endpoint.clone(), headers.clone(), state.clone(), get_inbound_tx.clone());
                }
            }
        });

        self.connected = true;
        Ok(ConnectedTransport { outbound_tx, inbound_rx, session_id: None, error_rx: None })
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        self.connected = false;
        let Some(session_id) = self.session_id() else {
            return Ok(());
        };
        // Best-effort: server support for DELETE is optional.
        let _ = self
            .client
            .delete(self.endpoint.clone())
            .header(SESSION_ID_HEADER, session_id)
            .send()
            .await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

fn spawn_unsolicited_get(
    client: Client,
    endpoint: Url,
    headers: HashMap<String, String>,
    state: NegotiatedState,
    inbound_tx: mpsc::UnboundedSender<JsonRpcMessage>,
) {
    tokio::spawn(async move {
        let Some(session_id) = state.session_id.lock().clone() else { return };
        let mut request = client.get(endpoint).header("Accept", "text/event-stream").header(SESSION_ID_HEADER, session_id);
        for (key, value) in &headers {
            request = request.header(key, value);
        }
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                consume_sse_response(response, &inbound_tx).await;
            }
            Ok(response) => {
                debug!(status = %response.status(), "server does not support unsolicited GET stream");
            }
            Err(e) => debug!("unsolicited GET failed: {e}"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_protocol_version_from_initialize_result() {
        let state = NegotiatedState::new();
        let message = JsonRpcMessage::Response(mcp_protocol::jsonrpc::JsonRpcResponse::new(
            mcp_protocol::meta::RequestId::Number(1),
            serde_json::json!({"protocolVersion": "2025-06-18"}),
        ));
        capture_protocol_version(&message, &state);
        assert_eq!(state.protocol_version.lock().clone(), Some("2025-06-18".to_string()));
    }
}
