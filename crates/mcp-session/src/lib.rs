//! The bidirectional session layer shared by every MCP transport: JSON-RPC
//! request/response correlation, notification dispatch, cancellation and
//! progress routing. Transports feed this layer raw `JsonRpcMessage`s and
//! otherwise know nothing about request ids or handler registries.

pub mod context;
pub mod error;
pub mod handlers;
pub mod pagination;
pub mod pending;
pub mod session;

pub use context::{SessionContext, Side};
pub use error::{SessionError, SessionResult};
pub use handlers::{HandlerRegistry, NotificationHandler, RequestHandler};
pub use pagination::{list_all, CursorPage, CursorParams};
pub use pending::PendingOutcome;
pub use session::{PeerCapability, Session, SessionState};
