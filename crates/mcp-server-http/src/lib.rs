//! Server-side Streamable HTTP transport: the per-session registry, idle
//! pruning, stateless mode, and the `hyper`-based accept loop.

pub mod error;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod session_manager;

pub use error::{HttpServerError, HttpServerResult};
pub use handler::SessionHandlerHook;
pub use server::{HttpMcpServer, HttpMcpServerBuilder, ServerConfig};
pub use session_manager::{SessionManager, SessionManagerConfig};
