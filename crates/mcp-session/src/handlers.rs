//! Handler registries: at most one request handler per method, any number of
//! notification handlers per method.

use crate::context::SessionContext;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use mcp_protocol::error::JsonRpcErrorObject;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Answers one inbound request method. Implementations should be quick to
/// return a result envelope (success or a tool-level error); anything that
/// needs real work should spawn its own task and only await the parts that
/// determine the response shape.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &SessionContext,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcErrorObject>;
}

#[async_trait]
impl<F, Fut> RequestHandler for F
where
    F: Fn(SessionContext, Option<serde_json::Value>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, JsonRpcErrorObject>> + Send,
{
    async fn handle(
        &self,
        ctx: &SessionContext,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcErrorObject> {
        (self)(ctx.clone(), params).await
    }
}

/// Observes one inbound notification method. Multiple handlers for the same
/// method all run; a slow handler delays delivery of later messages on this
/// session, so handlers should offload real work.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, ctx: &SessionContext, params: Option<serde_json::Value>);
}

#[async_trait]
impl<F, Fut> NotificationHandler for F
where
    F: Fn(SessionContext, Option<serde_json::Value>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    async fn handle(&self, ctx: &SessionContext, params: Option<serde_json::Value>) {
        (self)(ctx.clone(), params).await
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    requests: RwLock<HashMap<String, Arc<dyn RequestHandler>>>,
    notifications: RwLock<HashMap<String, Vec<Arc<dyn NotificationHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_request(&self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) -> SessionResult<()> {
        let method = method.into();
        let mut requests = self.requests.write();
        if requests.contains_key(&method) {
            return Err(SessionError::DuplicateHandler(method));
        }
        requests.insert(method, handler);
        Ok(())
    }

    pub fn register_notification(&self, method: impl Into<String>, handler: Arc<dyn NotificationHandler>) {
        self.notifications.write().entry(method.into()).or_default().push(handler);
    }

    pub fn request_handler(&self, method: &str) -> Option<Arc<dyn RequestHandler>> {
        self.requests.read().get(method).cloned()
    }

    pub fn notification_handlers(&self, method: &str) -> Vec<Arc<dyn NotificationHandler>> {
        self.notifications.read().get(method).cloned().unwrap_or_default()
    }
}
