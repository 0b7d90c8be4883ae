//! Client-side MCP transports: child-process stdio, legacy HTTP+SSE, and
//! Streamable HTTP, plus a wrapper that auto-detects between the latter two.

pub mod auto_detect;
pub mod config;
pub mod error;
pub mod sse;
#[cfg(feature = "stdio")]
pub mod stdio;
pub mod streamable_http;
pub mod transport;

pub use auto_detect::AutoDetectTransport;
pub use config::{HttpTransportConfig, StdioTransportConfig, TransportMode};
pub use error::{TransportError, TransportResult};
pub use sse::SseTransport;
pub use streamable_http::StreamableHttpTransport;
pub use transport::{BoxedTransport, ConnectedTransport, Transport, TransportCapabilities, TransportKind};
