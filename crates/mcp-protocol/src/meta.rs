//! Identifiers that thread through the JSON-RPC envelope without being part
//! of it: request ids, progress tokens, and opaque pagination cursors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A JSON-RPC request id: either a string or an integer.
///
/// Equality is by underlying type *and* value — `RequestId::Number(1)` is not
/// equal to `RequestId::String("1".into())`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

/// A token a caller attaches to `params._meta.progressToken` so that
/// `notifications/progress` for that request can be routed back to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Number(i64),
}

/// An opaque pagination cursor.
///
/// Callers MUST NOT parse this value; the type deliberately exposes no
/// accessor beyond `as_str`/`Display` so that misuse doesn't compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(opaque: impl Into<String>) -> Self {
        Self(opaque.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The `_meta` bag carried by requests and notifications. Only
/// `progressToken` is given protocol meaning; everything else round-trips
/// opaquely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "progressToken", skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<ProgressToken>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_round_trips_by_variant() {
        let s = RequestId::from("abc");
        let n = RequestId::from(42i64);
        assert_ne!(serde_json::to_value(&s).unwrap(), serde_json::to_value(&n));
        assert_eq!(serde_json::from_str::<RequestId>("42").unwrap(), n);
        assert_eq!(serde_json::from_str::<RequestId>("\"abc\"").unwrap(), s);
    }

    #[test]
    fn cursor_serializes_as_bare_string() {
        let cursor = Cursor::new("page-2");
        assert_eq!(serde_json::to_value(&cursor).unwrap(), serde_json::json!("page-2"));
    }
}
