//! Re-exports of the tool-service config types owned by `conductor-domain`,
//! kept here so callers can `use conductor_mcp_client::config::*` without
//! reaching into the domain crate directly.

pub use conductor_domain::config::{McpConfig, McpServerConfig, McpTransportKind};
