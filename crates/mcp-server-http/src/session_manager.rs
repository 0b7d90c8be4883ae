//! The server-side session registry for Streamable HTTP: stateful-mode
//! sessions keyed by an opaque id, idle pruning, and the stateless-mode
//! short-circuit that skips the registry entirely.

use crate::error::{HttpServerError, HttpServerResult};
use mcp_protocol::jsonrpc::JsonRpcMessage;
use mcp_protocol::meta::RequestId;
use mcp_session::{Session, SessionContext};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Per-session table of POST calls awaiting the response their request
/// produces. Consulted by the outbound-forwarding task spawned alongside
/// each session before it treats a message as unsolicited GET-stream
/// traffic.
#[derive(Default)]
pub struct AwaitingResponses {
    waiters: RwLock<HashMap<RequestId, oneshot::Sender<JsonRpcMessage>>>,
}

impl AwaitingResponses {
    pub fn register(&self, id: RequestId) -> oneshot::Receiver<JsonRpcMessage> {
        let (tx, rx) = oneshot::channel();
        self.waiters.write().insert(id, tx);
        rx
    }

    /// Returns `true` if `message` was claimed by a waiting POST.
    pub fn try_claim(&self, message: &JsonRpcMessage) -> bool {
        let id = match message {
            JsonRpcMessage::Response(r) => &r.id,
            JsonRpcMessage::Error(e) => &e.id,
            _ => return false,
        };
        match self.waiters.write().remove(id) {
            Some(tx) => {
                let _ = tx.send(message.clone());
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    pub stateless: bool,
    /// `None` means sessions never idle-expire.
    pub idle_timeout: Option<Duration>,
    pub max_idle_session_count: Option<usize>,
    pub per_session_execution_context: bool,
    pub sweep_interval: Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            stateless: false,
            idle_timeout: Some(Duration::from_secs(2 * 60 * 60)),
            max_idle_session_count: Some(10_000),
            per_session_execution_context: true,
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl SessionManagerConfig {
    pub fn validate(&self) -> HttpServerResult<()> {
        if let Some(max) = self.max_idle_session_count {
            if max == 0 && !self.stateless {
                return Err(HttpServerError::InvalidIdleConfig);
            }
        }
        Ok(())
    }
}

pub struct ServerSession {
    pub id: String,
    pub session: Arc<Session>,
    pub context: RwLock<SessionContext>,
    pub created_at: Instant,
    last_active: RwLock<Instant>,
    pub awaiting: Arc<AwaitingResponses>,
    /// Set while a GET stream is open; the outbound-forwarding task
    /// delivers anything not claimed by `awaiting` here. `None` means no
    /// GET is currently attached and such messages are dropped.
    unsolicited_tx: RwLock<Option<mpsc::UnboundedSender<JsonRpcMessage>>>,
    get_stream_open: AtomicBool,
}

impl ServerSession {
    pub fn touch(&self) {
        *self.last_active.write() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.read().elapsed()
    }

    /// Returns the receiver half of a fresh unsolicited-delivery channel, or
    /// `None` if a GET is already open on this session.
    pub fn open_get_stream(&self) -> Option<mpsc::UnboundedReceiver<JsonRpcMessage>> {
        if self.get_stream_open.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.unsolicited_tx.write() = Some(tx);
        Some(rx)
    }

    pub fn close_get_stream(&self) {
        self.get_stream_open.store(false, Ordering::SeqCst);
        *self.unsolicited_tx.write() = None;
    }

    fn deliver_unsolicited(&self, message: JsonRpcMessage) {
        let sent = self.unsolicited_tx.read().as_ref().map(|tx| tx.send(message));
        if sent.is_none() {
            debug!(session_id = %self.id, "dropping unsolicited message: no GET stream open");
        }
    }
}

pub struct SessionManager {
    config: SessionManagerConfig,
    sessions: RwLock<HashMap<String, Arc<ServerSession>>>,
}

impl SessionManager {
    pub fn new(config: SessionManagerConfig) -> HttpServerResult<Arc<Self>> {
        config.validate()?;
        let manager = Arc::new(Self { config, sessions: RwLock::new(HashMap::new()) });
        if !manager.config.stateless {
            Arc::clone(&manager).spawn_cleanup();
        }
        Ok(manager)
    }

    pub fn is_stateless(&self) -> bool {
        self.config.stateless
    }

    pub fn per_session_execution_context(&self) -> bool {
        self.config.per_session_execution_context
    }

    /// Forbidden in stateless mode: sampling, roots, elicitation, and any
    /// unsolicited server→client notification all require a registered
    /// session to deliver through.
    pub fn require_stateful(&self, operation: &'static str) -> HttpServerResult<()> {
        if self.config.stateless {
            Err(HttpServerError::StatelessModeForbidden(operation))
        } else {
            Ok(())
        }
    }

    /// Creates and registers a new session, wiring `outbound_rx` (the
    /// `Session`'s write side) into the awaiting-responses table and the
    /// unsolicited-GET slot: whatever the session's handlers write is either
    /// claimed by a POST still waiting on that request id, or forwarded to
    /// the open GET stream, or dropped if neither is listening.
    pub fn create_session(
        &self,
        session: Arc<Session>,
        context: SessionContext,
        mut outbound_rx: mpsc::UnboundedReceiver<JsonRpcMessage>,
    ) -> Arc<ServerSession> {
        let id = Uuid::now_v7().to_string();
        let entry = Arc::new(ServerSession {
            id: id.clone(),
            session,
            context: RwLock::new(context),
            created_at: Instant::now(),
            last_active: RwLock::new(Instant::now()),
            awaiting: Arc::new(AwaitingResponses::default()),
            unsolicited_tx: RwLock::new(None),
            get_stream_open: AtomicBool::new(false),
        });
        self.sessions.write().insert(id, Arc::clone(&entry));

        let forwarding = Arc::clone(&entry);
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if !forwarding.awaiting.try_claim(&message) {
                    forwarding.deliver_unsolicited(message);
                }
            }
        });

        entry
    }

    pub fn get(&self, id: &str) -> Option<Arc<ServerSession>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<ServerSession>> {
        let removed = self.sessions.write().remove(id);
        if let Some(session) = &removed {
            session.session.close();
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Round-trips a `ping` through the registered session to confirm its
    /// peer is still answering, independent of idle-timeout bookkeeping.
    pub async fn liveness_probe(&self, id: &str) -> HttpServerResult<()> {
        let session = self.get(id).ok_or(HttpServerError::UnknownSession)?;
        session.session.ping().await.map_err(HttpServerError::Session)
    }

    fn evict_idle(&self) {
        let Some(idle_timeout) = self.config.idle_timeout else {
            self.evict_over_cap();
            return;
        };

        let expired: Vec<String> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.idle_for() > idle_timeout)
            .map(|s| s.id.clone())
            .collect();

        for id in expired {
            if let Some(session) = self.remove(&id) {
                info!(session_id = %session.id, "evicted idle session");
            }
        }

        self.evict_over_cap();
    }

    fn evict_over_cap(&self) {
        let Some(max) = self.config.max_idle_session_count else { return };
        let count = self.session_count();
        if count <= max {
            return;
        }

        let mut by_idle: Vec<(String, Duration)> =
            self.sessions.read().values().map(|s| (s.id.clone(), s.idle_for())).collect();
        by_idle.sort_by(|a, b| b.1.cmp(&a.1));

        let overflow = count - max;
        for (id, _) in by_idle.into_iter().take(overflow) {
            if let Some(session) = self.remove(&id) {
                error!(session_id = %session.id, "evicted session: idle session count exceeds max_idle_session_count");
            }
        }
    }

    fn spawn_cleanup(self: Arc<Self>) {
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.evict_idle();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_session::{Session, SessionContext, Side};
    use mcp_protocol::version::McpVersion;

    fn new_session() -> (Arc<Session>, mpsc::UnboundedReceiver<JsonRpcMessage>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let session = Session::new(out_tx, SessionContext::new(Side::Server, McpVersion::LATEST));
        (session, out_rx)
    }

    fn stateful_manager() -> Arc<SessionManager> {
        SessionManager::new(SessionManagerConfig {
            stateless: false,
            idle_timeout: None,
            max_idle_session_count: None,
            per_session_execution_context: true,
            sweep_interval: Duration::from_secs(3600),
        })
        .unwrap()
    }

    #[test]
    fn validate_rejects_zero_max_idle_in_stateful_mode() {
        let config = SessionManagerConfig { max_idle_session_count: Some(0), ..SessionManagerConfig::default() };
        assert!(matches!(config.validate(), Err(HttpServerError::InvalidIdleConfig)));
    }

    #[test]
    fn validate_allows_zero_max_idle_in_stateless_mode() {
        let config =
            SessionManagerConfig { stateless: true, max_idle_session_count: Some(0), ..SessionManagerConfig::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn require_stateful_forbids_in_stateless_mode() {
        let manager = SessionManager::new(SessionManagerConfig { stateless: true, ..SessionManagerConfig::default() }).unwrap();
        assert!(matches!(
            manager.require_stateful("sampling"),
            Err(HttpServerError::StatelessModeForbidden("sampling"))
        ));
    }

    #[test]
    fn require_stateful_allows_in_stateful_mode() {
        let manager = stateful_manager();
        assert!(manager.require_stateful("sampling").is_ok());
    }

    #[tokio::test]
    async fn create_get_and_remove_round_trip() {
        let manager = stateful_manager();
        let (session, _out_rx) = new_session();
        let (_tx, rx) = mpsc::unbounded_channel();
        let ctx = SessionContext::new(Side::Server, McpVersion::LATEST);
        let created = manager.create_session(session, ctx, rx);

        assert_eq!(manager.session_count(), 1);
        assert!(manager.get(&created.id).is_some());

        let removed = manager.remove(&created.id).unwrap();
        assert_eq!(removed.id, created.id);
        assert_eq!(manager.session_count(), 0);
        assert!(manager.get(&created.id).is_none());
    }

    #[tokio::test]
    async fn outbound_response_is_claimed_by_awaiting_waiter() {
        let manager = stateful_manager();
        let (session, _out_rx) = new_session();
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = SessionContext::new(Side::Server, McpVersion::LATEST);
        let created = manager.create_session(session, ctx, rx);

        let id = RequestId::Number(1);
        let waiter = created.awaiting.register(id.clone());
        tx.send(JsonRpcMessage::Response(mcp_protocol::jsonrpc::JsonRpcResponse::new(id, serde_json::json!({}))))
            .unwrap();

        let claimed = waiter.await.unwrap();
        assert!(matches!(claimed, JsonRpcMessage::Response(_)));
    }

    #[tokio::test]
    async fn liveness_probe_round_trips_a_ping_through_the_open_get_stream() {
        let manager = stateful_manager();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let session = Session::new(out_tx, SessionContext::new(Side::Server, McpVersion::LATEST));
        let ctx = SessionContext::new(Side::Server, McpVersion::LATEST);
        let created = manager.create_session(session, ctx, out_rx);

        let mut get_rx = created.open_get_stream().unwrap();

        let probe = tokio::spawn({
            let manager = Arc::clone(&manager);
            let id = created.id.clone();
            async move { manager.liveness_probe(&id).await }
        });

        let JsonRpcMessage::Request(req) = get_rx.recv().await.unwrap() else { panic!("expected a ping request") };
        assert_eq!(req.method, "ping");
        created
            .session
            .handle_inbound(JsonRpcMessage::Response(mcp_protocol::jsonrpc::JsonRpcResponse::new(
                req.id,
                serde_json::json!({}),
            )))
            .await;

        assert!(probe.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn liveness_probe_errors_on_unknown_session() {
        let manager = stateful_manager();
        assert!(matches!(manager.liveness_probe("nope").await, Err(HttpServerError::UnknownSession)));
    }

    #[tokio::test]
    async fn unclaimed_outbound_message_is_delivered_to_open_get_stream() {
        let manager = stateful_manager();
        let (session, _out_rx) = new_session();
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = SessionContext::new(Side::Server, McpVersion::LATEST);
        let created = manager.create_session(session, ctx, rx);

        let mut get_rx = created.open_get_stream().unwrap();
        assert!(created.open_get_stream().is_none(), "a second concurrent GET must be refused");

        tx.send(JsonRpcMessage::Notification(mcp_protocol::jsonrpc::JsonRpcNotification::new(
            "notifications/message",
            None,
        )))
        .unwrap();

        let delivered = get_rx.recv().await.unwrap();
        assert!(matches!(delivered, JsonRpcMessage::Notification(_)));

        created.close_get_stream();
        assert!(created.open_get_stream().is_some());
    }

    #[tokio::test]
    async fn evict_idle_removes_sessions_past_the_timeout() {
        let manager = SessionManager::new(SessionManagerConfig {
            stateless: false,
            idle_timeout: Some(Duration::from_millis(0)),
            max_idle_session_count: None,
            per_session_execution_context: true,
            sweep_interval: Duration::from_secs(3600),
        })
        .unwrap();
        let (session, _out_rx) = new_session();
        let (_tx, rx) = mpsc::unbounded_channel();
        let ctx = SessionContext::new(Side::Server, McpVersion::LATEST);
        let created = manager.create_session(session, ctx, rx);

        tokio::time::sleep(Duration::from_millis(5)).await;
        manager.evict_idle();

        assert_eq!(manager.session_count(), 0);
        assert!(manager.get(&created.id).is_none());
    }

    #[tokio::test]
    async fn evict_over_cap_keeps_the_most_recently_active_sessions() {
        let manager = SessionManager::new(SessionManagerConfig {
            stateless: false,
            idle_timeout: None,
            max_idle_session_count: Some(1),
            per_session_execution_context: true,
            sweep_interval: Duration::from_secs(3600),
        })
        .unwrap();

        let (session_a, _out_rx_a) = new_session();
        let (_tx_a, rx_a) = mpsc::unbounded_channel();
        let older = manager.create_session(session_a, SessionContext::new(Side::Server, McpVersion::LATEST), rx_a);

        tokio::time::sleep(Duration::from_millis(5)).await;

        let (session_b, _out_rx_b) = new_session();
        let (_tx_b, rx_b) = mpsc::unbounded_channel();
        let newer = manager.create_session(session_b, SessionContext::new(Side::Server, McpVersion::LATEST), rx_b);

        manager.evict_over_cap();

        assert_eq!(manager.session_count(), 1);
        assert!(manager.get(&older.id).is_none());
        assert!(manager.get(&newer.id).is_some());
    }
}
