//! Builder and accept loop for the Streamable HTTP server, built directly
//! on `hyper` the way the teacher's own HTTP server crate is.

use crate::error::HttpServerResult;
use crate::handler::{self, HandlerState, SessionHandlerHook};
use crate::session_manager::{SessionManager, SessionManagerConfig};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use mcp_protocol::initialize::{Implementation, ServerCapabilities};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub server_info: Implementation,
    pub server_capabilities: ServerCapabilities,
    pub session_manager: SessionManagerConfig,
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr, server_info: Implementation) -> Self {
        Self {
            bind_addr,
            server_info,
            server_capabilities: ServerCapabilities::default(),
            session_manager: SessionManagerConfig::default(),
        }
    }

    pub fn stateless(mut self) -> Self {
        self.session_manager.stateless = true;
        self
    }

    pub fn with_capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.server_capabilities = capabilities;
        self
    }
}

pub struct HttpMcpServerBuilder {
    config: ServerConfig,
    session_hook: Option<SessionHandlerHook>,
}

impl HttpMcpServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self { config, session_hook: None }
    }

    /// Registers request/notification handlers on every new session, the
    /// moment it's created — this is where a host application wires up
    /// `tools/list`, `tools/call`, and friends.
    pub fn on_session_created(mut self, hook: SessionHandlerHook) -> Self {
        self.session_hook = Some(hook);
        self
    }

    pub fn build(self) -> HttpServerResult<HttpMcpServer> {
        let session_manager = SessionManager::new(self.config.session_manager.clone())?;
        let state = Arc::new(HandlerState {
            session_manager,
            server_info: self.config.server_info.clone(),
            server_capabilities: self.config.server_capabilities.clone(),
            session_hook: self.session_hook,
        });
        Ok(HttpMcpServer { bind_addr: self.config.bind_addr, state })
    }
}

pub struct HttpMcpServer {
    bind_addr: SocketAddr,
    state: Arc<HandlerState>,
}

impl HttpMcpServer {
    pub async fn serve(self) -> HttpServerResult<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "listening for MCP Streamable HTTP connections");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let service = service_fn(move |req| handler::handle(Arc::clone(&state), req));
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!(%peer, "connection error: {e}");
                }
            });
        }
    }
}
