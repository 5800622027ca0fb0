//! In-memory checkpoint store, keyed by thread-id.
//!
//! A `RwLock<HashMap<..>>` registry with idle-elapsed-minutes eviction,
//! adapted from disk-backed session-entry bookkeeping to an in-memory
//! `SessionState` checkpoint: session state is not persisted to disk.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use conductor_domain::config::SessionsConfig;
use conductor_domain::session::SessionState;
use parking_lot::RwLock;

use crate::dispatch::{self, DispatchedTurn};

struct Checkpoint {
    state: SessionState,
    touched_at: DateTime<Utc>,
}

/// Holds one [`SessionState`] checkpoint per thread-id.
pub struct CheckpointStore {
    max_iterations: u32,
    idle_timeout_minutes: u64,
    max_sessions: usize,
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
}

impl CheckpointStore {
    pub fn new(config: SessionsConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            idle_timeout_minutes: config.idle_timeout_minutes,
            max_sessions: config.max_sessions,
            checkpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Dispatch one inbound message for `thread_id` ( steps 1-2).
    /// Creates a fresh checkpoint on first contact. The returned
    /// [`DispatchedTurn`] is the caller's (the orchestration graph's) input;
    /// it is not written back until [`Self::commit`].
    pub fn dispatch(&self, thread_id: &str, message: &str, now: DateTime<Utc>) -> DispatchedTurn {
        let existing = {
            let mut checkpoints = self.checkpoints.write();
            checkpoints.remove(thread_id)
        };

        let state = match existing {
            Some(cp) => cp.state,
            None => {
                self.make_room(now);
                SessionState::new(thread_id, self.max_iterations)
            }
        };

        dispatch::dispatch(state, message)
    }

    /// Write a settled (or suspended) state back to the checkpoint, applying
    /// end-of-turn cleanup unless the turn is merely suspended at an
    /// interrupt — a suspended turn is not "settled" and must keep its
    /// working state intact for the resume.
    pub fn commit(&self, state: SessionState, settled: bool, now: DateTime<Utc>) {
        let mut state = state;
        if settled {
            state.end_turn_cleanup();
        }
        let thread_id = state.thread_id.clone();
        let mut checkpoints = self.checkpoints.write();
        checkpoints.insert(thread_id, Checkpoint { state, touched_at: now });
    }

    /// Fetch a clone of the current checkpoint, if any (read-only; does not
    /// affect idle eviction bookkeeping).
    pub fn peek(&self, thread_id: &str) -> Option<SessionState> {
        self.checkpoints.read().get(thread_id).map(|cp| cp.state.clone())
    }

    pub fn remove(&self, thread_id: &str) {
        self.checkpoints.write().remove(thread_id);
    }

    pub fn len(&self) -> usize {
        self.checkpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.read().is_empty()
    }

    /// Evict every checkpoint idle for longer than `idle_timeout_minutes`.
    /// Returns the number of checkpoints removed. Intended to be called
    /// periodically (e.g. from a background sweep task in the gateway).
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let timeout = self.idle_timeout_minutes as i64;
        let mut checkpoints = self.checkpoints.write();
        let before = checkpoints.len();
        checkpoints.retain(|_, cp| now.signed_duration_since(cp.touched_at).num_minutes() < timeout);
        before - checkpoints.len()
    }

    /// Evict the single oldest-idle checkpoint if inserting a new one would
    /// exceed `max_sessions`. Called only on the create-new-session path;
    /// existing sessions never get evicted out from under an in-flight turn.
    fn make_room(&self, now: DateTime<Utc>) {
        let mut checkpoints = self.checkpoints.write();
        if checkpoints.len() < self.max_sessions {
            return;
        }
        if let Some(oldest_key) = checkpoints
            .iter()
            .min_by_key(|(_, cp)| cp.touched_at)
            .map(|(k, _)| k.clone())
        {
            tracing::warn!(
                thread_id = %oldest_key,
                max_sessions = self.max_sessions,
                "evicting oldest-idle checkpoint to make room for a new session"
);
            checkpoints.remove(&oldest_key);
        }
        let _ = now;
    }
}
