//! Shared application state passed to every WebSocket connection.
//!
//! A struct-of-`Arc`s `AppState`, trimmed to the subsystems this agent
//! actually needs: no memory provider, skills registry, workspace reader,
//! bootstrap tracker, run/schedule/delivery stores, sub-agent manager, or
//! exec process manager — this orchestrator doesn't carry those surfaces.

use std::sync::Arc;

use conductor_domain::config::Config;
use conductor_mcp_client::McpManager;
use conductor_providers::ProviderRegistry;
use conductor_sessions::CheckpointStore;

use crate::cancel::CancelMap;
use crate::session_lock::SessionLockMap;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub checkpoints: Arc<CheckpointStore>,
    pub mcp: Arc<McpManager>,
    pub llm: Arc<ProviderRegistry>,
    pub session_locks: Arc<SessionLockMap>,
    pub cancel_map: Arc<CancelMap>,
}
