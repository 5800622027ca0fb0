//! Configuration for the Tool Transport Adapter's subprocess registry.
//! Each entry is a tool service — the CRM, the transactional-email
//! sender, the URL shortener, or any other MCP-speaking subprocess — and
//! its `id` doubles as the routing name the Orchestrator Decision Node
//! and the Generic Dynamic Caller address it by.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

impl McpConfig {
    pub fn find(&self, id: &str) -> Option<&McpServerConfig> {
        self.servers.iter().find(|s| s.id == id)
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.id.as_str()).collect()
    }
}

/// Configuration for a single tool-service subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique identifier, also the service/routing name (e.g. `"salesforce"`,
    /// `"brevo"`, `"linkly"`).
    pub id: String,

    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub transport: McpTransportKind,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Per-call timeout override; falls back to `limits.model_call_deadline_ms`'s
    /// sibling `limits.tool_call_timeout_ms` when unset.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    #[default]
    Stdio,
    Sse,
}
