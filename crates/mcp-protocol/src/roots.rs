//! `roots/list` — the filesystem/URI roots the client exposes to the server.

use serde::{Deserialize, Serialize};

pub mod method {
    pub const LIST: &str = "roots/list";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRootsResult {
    pub roots: Vec<Root>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootsListChangedNotification {}
