//! The Tool Transport Adapter : spawns one subprocess per
//! configured tool service, speaks newline-delimited JSON-RPC 2.0 (the MCP
//! wire protocol) over its stdio, and normalizes results for the
//! orchestrator.
//!
//! ```ignore
//! let manager = McpManager::from_config(&config.mcp, config.limits.tool_call_timeout_ms).await;
//! let result = manager.call_tool("salesforce", "query_contacts", args).await?;
//! let rows = rows::extract_rows(&result);
//! ```

pub mod config;
pub mod manager;
pub mod protocol;
pub mod rows;
pub mod transport;

pub use config::{McpConfig, McpServerConfig, McpTransportKind};
pub use manager::{McpError, McpManager, McpServer};
pub use protocol::McpToolDef;
pub use rows::{extract_rows, is_error};
pub use transport::{McpTransport, StdioTransport, TransportError};
