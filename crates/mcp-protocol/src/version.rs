//! The negotiable `protocolVersion` strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A protocol revision, identified the way MCP identifies them: a date
/// string. Order matters for compatibility checks — newer variants must
/// stay below older ones in this enum's match arms only by convention, not
/// by derive, since they don't have a total numeric order beyond `LATEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum McpVersion {
    #[serde(rename = "2024-11-05")]
    V2024_11_05,
    #[serde(rename = "2025-03-26")]
    V2025_03_26,
    #[serde(rename = "2025-06-18")]
    V2025_06_18,
}

impl McpVersion {
    pub const LATEST: McpVersion = McpVersion::V2025_06_18;

    pub const ALL: [McpVersion; 3] =
        [McpVersion::V2024_11_05, McpVersion::V2025_03_26, McpVersion::V2025_06_18];

    pub fn as_str(&self) -> &'static str {
        match self {
            McpVersion::V2024_11_05 => "2024-11-05",
            McpVersion::V2025_03_26 => "2025-03-26",
            McpVersion::V2025_06_18 => "2025-06-18",
        }
    }

    pub fn is_supported(candidate: &str) -> bool {
        Self::ALL.iter().any(|v| v.as_str() == candidate)
    }

    /// The SSE legacy transport is only specified for this revision.
    pub fn uses_legacy_sse(&self) -> bool {
        matches!(self, McpVersion::V2024_11_05)
    }

    /// Streamable HTTP, including the `Mcp-Session-Id`/`MCP-Protocol-Version`
    /// headers, is only specified from this revision onward.
    pub fn supports_streamable_http(&self) -> bool {
        !matches!(self, McpVersion::V2024_11_05)
    }
}

impl fmt::Display for McpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for McpVersion {
    type Err = crate::error::McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| crate::error::McpError::UnsupportedVersion(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_is_2025_06_18() {
        assert_eq!(McpVersion::LATEST, McpVersion::V2025_06_18);
    }

    #[test]
    fn rejects_unknown_version() {
        assert!(McpVersion::from_str("1999-01-01").is_err());
        assert!(!McpVersion::is_supported("1999-01-01"));
    }

    #[test]
    fn serializes_as_date_string() {
        assert_eq!(serde_json::to_value(McpVersion::LATEST).unwrap(), serde_json::json!("2025-06-18"));
    }
}
