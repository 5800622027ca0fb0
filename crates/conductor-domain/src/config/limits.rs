use serde::{Deserialize, Serialize};

/// Concurrency and resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Deadline for a single model call.
    #[serde(default = "d_model_call_deadline_ms")]
    pub model_call_deadline_ms: u64,

    /// Deadline for a single tool subprocess call, used when a service
    /// doesn't override it in `[[mcp.servers]]`.
    #[serde(default = "d_tool_call_timeout_ms")]
    pub tool_call_timeout_ms: u64,

    /// Maximum records accepted in one batch-capable call.
    #[serde(default = "d_max_batch_size")]
    pub max_batch_size: usize,

    /// Upper bound on how many sessions may process turns concurrently
    /// before new connections are queued.
    #[serde(default = "d_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            model_call_deadline_ms: d_model_call_deadline_ms,
            tool_call_timeout_ms: d_tool_call_timeout_ms,
            max_batch_size: d_max_batch_size,
            max_concurrent_sessions: d_max_concurrent_sessions,
        }
    }
}

fn d_model_call_deadline_ms() -> u64 {
    30_000
}
fn d_tool_call_timeout_ms() -> u64 {
    30_000
}
fn d_max_batch_size() -> usize {
    200
}
fn d_max_concurrent_sessions() -> usize {
    256
}
