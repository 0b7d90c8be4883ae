//! The JSON-RPC 2.0 envelope shared by every MCP message.

use crate::error::JsonRpcErrorObject;
use crate::meta::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const JSONRPC_VERSION: &str = "2.0";

/// Untyped request/notification params: either a positional array or a
/// named-field object. MCP only ever uses the object form but the envelope
/// itself, per JSON-RPC 2.0, allows both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestParams {
    Array(Vec<Value>),
    Object(serde_json::Map<String, Value>),
}

impl RequestParams {
    pub fn as_value(&self) -> Value {
        match self {
            RequestParams::Array(a) => Value::Array(a.clone()),
            RequestParams::Object(o) => Value::Object(o.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<RequestParams>,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params: params.map(|v| match v {
                Value::Array(a) => RequestParams::Array(a),
                Value::Object(o) => RequestParams::Object(o),
                other => RequestParams::Array(vec![other]),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<RequestParams>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: params.map(|v| match v {
                Value::Array(a) => RequestParams::Array(a),
                Value::Object(o) => RequestParams::Object(o),
                other => RequestParams::Array(vec![other]),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

impl JsonRpcResponse {
    pub fn new(id: RequestId, result: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), id, result }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub jsonrpc: String,
    pub id: RequestId,
    pub error: JsonRpcErrorObject,
}

impl JsonRpcError {
    pub fn new(id: RequestId, error: JsonRpcErrorObject) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), id, error }
    }
}

/// Any one of the four JSON-RPC message shapes. The variant is determined by
/// which of `id`/`method`/`result`/`error` are present, not by a tag field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
    Error(JsonRpcError),
}

impl JsonRpcMessage {
    /// Parses one complete frame. Field-presence order matters: a message
    /// with both `method` and `id` is a request, not a notification.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let has_method = value.get("method").is_some();
        let has_id = value.get("id").is_some();
        let has_error = value.get("error").is_some();

        if has_method {
            if has_id {
                Ok(JsonRpcMessage::Request(serde_json::from_value(value)?))
            } else {
                Ok(JsonRpcMessage::Notification(serde_json::from_value(value)?))
            }
        } else if has_error {
            Ok(JsonRpcMessage::Error(serde_json::from_value(value)?))
        } else {
            Ok(JsonRpcMessage::Response(serde_json::from_value(value)?))
        }
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.id),
            JsonRpcMessage::Response(r) => Some(&r.id),
            JsonRpcMessage::Error(e) => Some(&e.id),
            JsonRpcMessage::Notification(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_request_vs_notification() {
        let req = json!({"jsonrpc":"2.0","id":1,"method":"ping"});
        let notif = json!({"jsonrpc":"2.0","method":"notifications/initialized"});
        assert!(matches!(JsonRpcMessage::from_value(req).unwrap(), JsonRpcMessage::Request(_)));
        assert!(matches!(JsonRpcMessage::from_value(notif).unwrap(), JsonRpcMessage::Notification(_)));
    }

    #[test]
    fn classifies_response_vs_error() {
        let resp = json!({"jsonrpc":"2.0","id":1,"result":{}});
        let err = json!({"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"nope"}});
        assert!(matches!(JsonRpcMessage::from_value(resp).unwrap(), JsonRpcMessage::Response(_)));
        assert!(matches!(JsonRpcMessage::from_value(err).unwrap(), JsonRpcMessage::Error(_)));
    }

    #[test]
    fn request_with_object_params_round_trips() {
        let req = JsonRpcRequest::new(RequestId::Number(7), "tools/call", Some(json!({"name":"x"})));
        let bytes = serde_json::to_vec(&req).unwrap();
        let msg = JsonRpcMessage::from_slice(&bytes).unwrap();
        assert_eq!(msg.request_id(), Some(&RequestId::Number(7)));
    }
}
