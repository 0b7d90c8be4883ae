//! Convenience re-exports for downstream crates.

pub use crate::completion::{CompleteArgument, CompleteParams, CompleteRef, CompleteResult, CompletionValues};
pub use crate::content::{BlobResourceContents, ContentBlock, ResourceContents, TextResourceContents};
pub use crate::elicitation::{method as elicitation_method, ElicitAction, ElicitParams, ElicitRequestedSchema, ElicitResult};
pub use crate::error::{error_codes, JsonRpcErrorObject, McpError, McpResult};
pub use crate::initialize::{
    ClientCapabilities, Implementation, InitializeParams, InitializeResult, ServerCapabilities,
};
pub use crate::jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestParams,
};
pub use crate::logging::{LoggingLevel, LoggingMessageNotification, SetLevelParams};
pub use crate::meta::{Cursor, Meta, ProgressToken, RequestId};
pub use crate::notifications::{method as notification_method, CancelledParams, ProgressParams};
pub use crate::ping::method as ping_method;
pub use crate::prompts::{method as prompts_method, GetPromptParams, GetPromptResult, ListPromptsParams, ListPromptsResult, Prompt};
pub use crate::resources::{
    method as resources_method, ListResourcesParams, ListResourcesResult, ReadResourceParams, ReadResourceResult,
    Resource,
};
pub use crate::roots::{method as roots_method, ListRootsResult, Root};
pub use crate::sampling::{method as sampling_method, CreateMessageParams, CreateMessageResult, ModelPreferences, Role, SamplingMessage};
pub use crate::tools::{method as tools_method, CallToolParams, CallToolResult, ListToolsParams, ListToolsResult, Tool};
pub use crate::version::McpVersion;
