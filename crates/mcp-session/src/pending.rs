//! The pending-request correlation map: one entry per in-flight outbound
//! request, removed exactly once by whichever of {response, cancellation,
//! session close} reaches it first.

use crate::error::{SessionError, SessionResult};
use mcp_protocol::jsonrpc::{JsonRpcError, JsonRpcResponse};
use mcp_protocol::meta::{ProgressToken, RequestId};
use mcp_protocol::notifications::ProgressParams;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// How a pending request's future resolves. Kept distinct from a generic
/// `Result<Value, JsonRpcErrorObject>` so a cancelled or session-closed
/// request is never mistaken for a peer-returned protocol error.
#[derive(Debug)]
pub enum PendingOutcome {
    Response(serde_json::Value),
    PeerError(mcp_protocol::error::JsonRpcErrorObject),
    Cancelled,
    Closed,
}

struct PendingEntry {
    completion: oneshot::Sender<PendingOutcome>,
}

/// Tracks outbound requests awaiting a response. Insertion and removal are
/// both O(1) and lock-scoped to the map itself, never to the awaiting
/// future, so a slow handler elsewhere can't stall unrelated completions.
#[derive(Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<RequestId, PendingEntry>>,
    progress_listeners: Mutex<HashMap<ProgressToken, mpsc::UnboundedSender<ProgressParams>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new pending request and returns the receiver half the
    /// caller awaits. If `progress_token` is set, progress notifications
    /// carrying that token are forwarded on `progress_rx` until the request
    /// completes or the session closes.
    pub fn insert(
        &self,
        id: RequestId,
        progress_token: Option<ProgressToken>,
    ) -> (oneshot::Receiver<PendingOutcome>, Option<mpsc::UnboundedReceiver<ProgressParams>>) {
        let (tx, rx) = oneshot::channel();
        self.entries.lock().insert(id, PendingEntry { completion: tx });

        let progress_rx = progress_token.map(|token| {
            let (ptx, prx) = mpsc::unbounded_channel();
            self.progress_listeners.lock().insert(token, ptx);
            prx
        });

        (rx, progress_rx)
    }

    pub fn complete_ok(&self, response: JsonRpcResponse) {
        if let Some(entry) = self.entries.lock().remove(&response.id) {
            let _ = entry.completion.send(PendingOutcome::Response(response.result));
        }
    }

    pub fn complete_err(&self, error: JsonRpcError) {
        if let Some(entry) = self.entries.lock().remove(&error.id) {
            let _ = entry.completion.send(PendingOutcome::PeerError(error.error));
        }
    }

    /// Routes a progress notification to whichever request registered its
    /// token, if any. Tokens with no listener are silently dropped — the
    /// peer is allowed to send progress for a request the caller has
    /// already stopped watching.
    pub fn route_progress(&self, params: ProgressParams) {
        let listeners = self.progress_listeners.lock();
        if let Some(tx) = listeners.get(&params.progress_token) {
            let _ = tx.send(params);
        }
    }

    pub fn forget_progress(&self, token: &ProgressToken) {
        self.progress_listeners.lock().remove(token);
    }

    pub fn cancel(&self, id: &RequestId) -> SessionResult<()> {
        let entry = self.entries.lock().remove(id);
        match entry {
            Some(entry) => {
                let _ = entry.completion.send(PendingOutcome::Cancelled);
                Ok(())
            }
            None => Err(SessionError::UnknownRequestId(id.clone())),
        }
    }

    /// Fails every still-pending request — called once, when the session
    /// transport closes.
    pub fn fail_all_closed(&self) {
        let mut entries = self.entries.lock();
        for (_, entry) in entries.drain() {
            let _ = entry.completion.send(PendingOutcome::Closed);
        }
        self.progress_listeners.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type SharedPendingRequests = Arc<PendingRequests>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_pending_request_with_result() {
        let pending = PendingRequests::new();
        let id = RequestId::Number(1);
        let (rx, _progress) = pending.insert(id.clone(), None);
        pending.complete_ok(JsonRpcResponse::new(id, serde_json::json!({"ok": true})));
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, PendingOutcome::Response(v) if v == serde_json::json!({"ok": true})));
    }

    #[tokio::test]
    async fn fail_all_closed_resolves_every_pending_future() {
        let pending = PendingRequests::new();
        let (rx1, _) = pending.insert(RequestId::Number(1), None);
        let (rx2, _) = pending.insert(RequestId::Number(2), None);
        pending.fail_all_closed();
        assert!(matches!(rx1.await.unwrap(), PendingOutcome::Closed));
        assert!(matches!(rx2.await.unwrap(), PendingOutcome::Closed));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn cancel_resolves_the_pending_future_as_cancelled_not_a_peer_error() {
        let pending = PendingRequests::new();
        let id = RequestId::Number(1);
        let (rx, _progress) = pending.insert(id.clone(), None);
        pending.cancel(&id).unwrap();
        assert!(matches!(rx.await.unwrap(), PendingOutcome::Cancelled));
    }

    #[tokio::test]
    async fn progress_routes_only_to_matching_token() {
        let pending = PendingRequests::new();
        let token = ProgressToken::String("t1".into());
        let (_rx, progress_rx) = pending.insert(RequestId::Number(1), Some(token.clone()));
        let mut progress_rx = progress_rx.unwrap();

        pending.route_progress(ProgressParams {
            progress_token: token,
            progress: 0.5,
            total: None,
            message: None,
        });
        pending.route_progress(ProgressParams {
            progress_token: ProgressToken::String("other".into()),
            progress: 1.0,
            total: None,
            message: None,
        });

        let received = progress_rx.recv().await.unwrap();
        assert_eq!(received.progress, 0.5);
        assert!(progress_rx.try_recv().is_err());
    }

    #[test]
    fn cancel_unknown_id_errors() {
        let pending = PendingRequests::new();
        assert!(pending.cancel(&RequestId::Number(99)).is_err());
    }
}
