//! The session layer: a transport-agnostic JSON-RPC message loop sitting on
//! top of a single-writer outbound channel and a single-reader inbound
//! channel that some `mcp-transport` implementation feeds.

use crate::context::SessionContext;
use crate::error::{SessionError, SessionResult};
use crate::handlers::{HandlerRegistry, NotificationHandler, RequestHandler};
use crate::pending::{PendingOutcome, PendingRequests, SharedPendingRequests};
use mcp_protocol::error::JsonRpcErrorObject;
use mcp_protocol::initialize::ClientCapabilities;
use mcp_protocol::jsonrpc::{JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use mcp_protocol::meta::{ProgressToken, RequestId};
use mcp_protocol::notifications::{method as notif, CancelledParams, ProgressParams};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connecting,
    Running,
    Closing,
    Closed,
}

/// A server→client operation gated on the peer having advertised the
/// matching client capability during initialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerCapability {
    Sampling,
    Roots,
    Elicitation,
}

impl PeerCapability {
    fn is_advertised(self, capabilities: &ClientCapabilities) -> bool {
        match self {
            PeerCapability::Sampling => capabilities.supports_sampling(),
            PeerCapability::Roots => capabilities.supports_roots(),
            PeerCapability::Elicitation => capabilities.supports_elicitation(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            PeerCapability::Sampling => "sampling",
            PeerCapability::Roots => "roots",
            PeerCapability::Elicitation => "elicitation",
        }
    }
}

/// A bidirectional JSON-RPC session. One instance per logical connection,
/// shared via `Arc` between the task driving the message loop and any
/// callers issuing requests/notifications concurrently.
pub struct Session {
    context: RwLock<SessionContext>,
    pending: SharedPendingRequests,
    handlers: HandlerRegistry,
    outbound_tx: mpsc::UnboundedSender<JsonRpcMessage>,
    next_id: AtomicI64,
    state: RwLock<SessionState>,
    inbound_cancellation: parking_lot::Mutex<HashMap<RequestId, CancellationToken>>,
}

impl Session {
    pub fn new(outbound_tx: mpsc::UnboundedSender<JsonRpcMessage>, context: SessionContext) -> Arc<Self> {
        Arc::new(Self {
            context: RwLock::new(context),
            pending: Arc::new(PendingRequests::new()),
            handlers: HandlerRegistry::new(),
            outbound_tx,
            next_id: AtomicI64::new(1),
            state: RwLock::new(SessionState::Unconnected),
            inbound_cancellation: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    pub fn context(&self) -> SessionContext {
        self.context.read().clone()
    }

    pub fn set_context(&self, ctx: SessionContext) {
        *self.context.write() = ctx;
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Running
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn register_request_handler(&self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) -> SessionResult<()> {
        self.handlers.register_request(method, handler)
    }

    pub fn register_notification_handler(&self, method: impl Into<String>, handler: Arc<dyn NotificationHandler>) {
        self.handlers.register_notification(method, handler)
    }

    fn send_raw(&self, message: JsonRpcMessage) -> SessionResult<()> {
        self.outbound_tx.send(message).map_err(|_| SessionError::Closed)
    }

    /// Sends a request and awaits its correlated response. If `progress_token`
    /// is set, the caller should instead use [`Session::send_request_with_progress`]
    /// to also receive progress notifications.
    pub async fn send_request(&self, method: &str, params: Option<serde_json::Value>) -> SessionResult<serde_json::Value> {
        let (result, _progress) = self.send_request_with_progress(method, params, None).await?;
        Ok(result)
    }

    pub async fn send_request_with_progress(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        progress_token: Option<ProgressToken>,
    ) -> SessionResult<(serde_json::Value, Option<mpsc::UnboundedReceiver<ProgressParams>>)> {
        if self.state() == SessionState::Closed {
            return Err(SessionError::Closed);
        }

        let id = self.next_request_id();
        let params = attach_progress_token(params, &progress_token);
        let (rx, progress_rx) = self.pending.insert(id.clone(), progress_token);

        debug!(request_id = %id, method, "sending request");
        self.send_raw(JsonRpcMessage::Request(JsonRpcRequest::new(id.clone(), method, params)))?;

        match rx.await {
            Ok(PendingOutcome::Response(result)) => Ok((result, progress_rx)),
            Ok(PendingOutcome::PeerError(err)) => Err(SessionError::Protocol(err.into())),
            Ok(PendingOutcome::Cancelled) => Err(SessionError::Cancelled(id)),
            Ok(PendingOutcome::Closed) | Err(_) => Err(SessionError::Closed),
        }
    }

    pub fn send_notification(&self, method: &str, params: Option<serde_json::Value>) -> SessionResult<()> {
        self.send_raw(JsonRpcMessage::Notification(JsonRpcNotification::new(method, params)))
    }

    /// Round-trips a `ping` to the peer. Either side may call this at any
    /// point after the transport connects; a successful return means the
    /// peer is alive and answering, independent of whether the session has
    /// finished `initialize`.
    pub async fn ping(&self) -> SessionResult<()> {
        self.send_request(mcp_protocol::ping::method::PING, None).await.map(|_| ())
    }

    /// Sends a request that requires a capability the peer must have
    /// advertised during initialize — `sampling/createMessage`,
    /// `roots/list`, `elicitation/create`. Forbidden outright in stateless
    /// mode (no peer connection outlives the POST that created it), and
    /// forbidden when the capability itself was never advertised.
    pub async fn send_gated_request(
        &self,
        capability: PeerCapability,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> SessionResult<serde_json::Value> {
        let ctx = self.context();
        if ctx.stateless {
            return Err(SessionError::StatelessModeForbidden);
        }
        if !capability.is_advertised(&ctx.client_capabilities) {
            return Err(SessionError::CapabilityNotAdvertised(capability.name()));
        }
        self.send_request(method, params).await
    }

    /// Cancels an outbound request: fails its pending future immediately and
    /// emits `notifications/cancelled` on a best-effort basis. Does not wait
    /// for the peer to acknowledge.
    pub fn cancel_request(&self, id: RequestId, reason: Option<String>) -> SessionResult<()> {
        self.pending.cancel(&id)?;
        let params = serde_json::to_value(CancelledParams { request_id: id, reason }).ok();
        self.send_notification(notif::CANCELLED, params)
    }

    /// Drives the inbound message loop until the channel closes. Call on a
    /// dedicated task; this future does not return until the session ends.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::UnboundedReceiver<JsonRpcMessage>) {
        self.set_state(SessionState::Running);
        while let Some(message) = inbound.recv().await {
            self.handle_inbound(message).await;
        }
        self.close();
    }

    /// Processes one inbound frame directly, without an inbound channel.
    /// Used by server-side transports (e.g. one HTTP POST body at a time)
    /// that don't have a persistent reader loop.
    pub async fn handle_inbound(self: &Arc<Self>, message: JsonRpcMessage) {
        match message {
            JsonRpcMessage::Response(resp) => self.pending.complete_ok(resp),
            JsonRpcMessage::Error(err) => self.pending.complete_err(err),
            JsonRpcMessage::Notification(notification) => self.dispatch_notification(notification).await,
            JsonRpcMessage::Request(request) => self.dispatch_request(request),
        }
    }

    async fn dispatch_notification(self: &Arc<Self>, notification: JsonRpcNotification) {
        let params = notification.params.as_ref().map(|p| p.as_value());
        match notification.method.as_str() {
            notif::CANCELLED => {
                if let Some(params) = params.clone() {
                    if let Ok(cancelled) = serde_json::from_value::<CancelledParams>(params) {
                        if let Some(token) = self.inbound_cancellation.lock().remove(&cancelled.request_id) {
                            token.cancel();
                        }
                    }
                }
            }
            notif::PROGRESS => {
                if let Some(params) = params.clone() {
                    if let Ok(progress) = serde_json::from_value::<ProgressParams>(params) {
                        self.pending.route_progress(progress);
                    }
                }
            }
            method => {
                let ctx = self.context();
                for handler in self.handlers.notification_handlers(method) {
                    handler.handle(&ctx, params.clone()).await;
                }
            }
        }
    }

    fn dispatch_request(self: &Arc<Self>, request: JsonRpcRequest) {
        if request.method == mcp_protocol::ping::method::PING {
            let _ = self.send_raw(JsonRpcMessage::Response(JsonRpcResponse::new(request.id, serde_json::json!({}))));
            return;
        }

        let Some(handler) = self.handlers.request_handler(&request.method) else {
            warn!(method = %request.method, "no handler registered; replying method-not-found");
            let _ = self.send_raw(JsonRpcMessage::Error(JsonRpcError::new(
                request.id,
                JsonRpcErrorObject::method_not_found(&request.method),
            )));
            return;
        };

        let token = CancellationToken::new();
        self.inbound_cancellation.lock().insert(request.id.clone(), token.clone());

        let session = Arc::clone(self);
        let params = request.params.map(|p| p.as_value());
        let id = request.id.clone();
        let ctx = self.context();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                result = handler.handle(&ctx, params) => result,
                _ = token.cancelled() => {
                    debug!(request_id = %id, "inbound request cancelled before handler completed");
                    return;
                }
            };
            session.inbound_cancellation.lock().remove(&id);
            let message = match outcome {
                Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(id, result)),
                Err(err) => JsonRpcMessage::Error(JsonRpcError::new(id, err)),
            };
            if session.send_raw(message).is_err() {
                error!("failed to write response: session closed");
            }
        });
    }

    /// Idempotent. Fails all pending requests and marks the session closed.
    pub fn close(&self) {
        let mut state = self.state.write();
        if *state == SessionState::Closed {
            return;
        }
        *state = SessionState::Closed;
        drop(state);
        info!("session closed");
        self.pending.fail_all_closed();
        for (_, token) in self.inbound_cancellation.lock().drain() {
            token.cancel();
        }
    }
}

fn attach_progress_token(params: Option<serde_json::Value>, token: &Option<ProgressToken>) -> Option<serde_json::Value> {
    let Some(token) = token else { return params };
    let mut value = params.unwrap_or_else(|| serde_json::json!({}));
    if let serde_json::Value::Object(map) = &mut value {
        let meta = map.entry("_meta").or_insert_with(|| serde_json::json!({}));
        if let serde_json::Value::Object(meta_map) = meta {
            meta_map.insert("progressToken".to_string(), serde_json::to_value(token).unwrap());
        }
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Side;
    use mcp_protocol::version::McpVersion;

    fn new_test_session() -> (Arc<Session>, mpsc::UnboundedReceiver<JsonRpcMessage>, mpsc::UnboundedSender<JsonRpcMessage>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let session = Session::new(out_tx, SessionContext::new(Side::Client, McpVersion::LATEST));
        let driver = Arc::clone(&session);
        tokio::spawn(async move { driver.run(in_rx).await });
        (session, out_rx, in_tx)
    }

    #[tokio::test]
    async fn send_request_resolves_on_matching_response() {
        let (session, mut out_rx, in_tx) = new_test_session();
        let send = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.send_request("ping", None).await }
        });

        let outbound = out_rx.recv().await.unwrap();
        let JsonRpcMessage::Request(req) = outbound else { panic!("expected request") };
        in_tx.send(JsonRpcMessage::Response(JsonRpcResponse::new(req.id, serde_json::json!({})))).unwrap();

        let result = send.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unregistered_method_replies_method_not_found() {
        let (_session, mut out_rx, in_tx) = new_test_session();
        in_tx
            .send(JsonRpcMessage::Request(JsonRpcRequest::new(RequestId::Number(1), "nope", None)))
            .unwrap();

        let outbound = out_rx.recv().await.unwrap();
        let JsonRpcMessage::Error(err) = outbound else { panic!("expected error response") };
        assert_eq!(err.error.code, mcp_protocol::error::error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn closing_session_fails_pending_requests() {
        let (session, _out_rx, _in_tx) = new_test_session();
        let send = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.send_request("slow", None).await }
        });
        tokio::task::yield_now().await;
        session.close();
        assert!(send.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn gated_request_forbidden_in_stateless_mode_even_if_advertised() {
        let (session, _out_rx, _in_tx) = new_test_session();
        let mut ctx = session.context();
        ctx.stateless = true;
        ctx.client_capabilities.sampling = Some(mcp_protocol::initialize::SamplingCapabilities {});
        session.set_context(ctx);

        let result = session.send_gated_request(PeerCapability::Sampling, "sampling/createMessage", None).await;
        assert!(matches!(result, Err(SessionError::StatelessModeForbidden)));
    }

    #[tokio::test]
    async fn gated_request_rejects_unadvertised_capability() {
        let (session, _out_rx, _in_tx) = new_test_session();
        let result = session.send_gated_request(PeerCapability::Roots, "roots/list", None).await;
        assert!(matches!(result, Err(SessionError::CapabilityNotAdvertised("roots"))));
    }

    #[tokio::test]
    async fn gated_request_proceeds_when_capability_advertised() {
        let (session, mut out_rx, in_tx) = new_test_session();
        let mut ctx = session.context();
        ctx.client_capabilities.roots = Some(mcp_protocol::initialize::RootsCapabilities::default());
        session.set_context(ctx);

        let send = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.send_gated_request(PeerCapability::Roots, "roots/list", None).await }
        });

        let outbound = out_rx.recv().await.unwrap();
        let JsonRpcMessage::Request(req) = outbound else { panic!("expected request") };
        in_tx.send(JsonRpcMessage::Response(JsonRpcResponse::new(req.id, serde_json::json!({})))).unwrap();

        assert!(send.await.unwrap().is_ok());
    }
}
