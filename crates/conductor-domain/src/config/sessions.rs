use serde::{Deserialize, Serialize};

/// Session lifecycle and iteration limits. No multi-channel identity
/// resolution — this crate is WebSocket-only and keys sessions by
/// `thread_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Inner planner/executor loop bound ( default 10).
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,

    /// How long an idle session checkpoint is retained before eviction
    /// (spec's C1 eviction-policy note in SPEC_FULL.md).
    #[serde(default = "d_idle_minutes")]
    pub idle_timeout_minutes: u64,

    /// Upper bound on concurrently held checkpoints; oldest-idle is evicted
    /// first when the cap is hit.
    #[serde(default = "d_max_sessions")]
    pub max_sessions: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_iterations: d_max_iterations,
            idle_timeout_minutes: d_idle_minutes,
            max_sessions: d_max_sessions,
        }
    }
}

fn d_max_iterations() -> u32 {
    10
}
fn d_idle_minutes() -> u64 {
    60
}
fn d_max_sessions() -> usize {
    10_000
}
