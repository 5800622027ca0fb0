//! Client channel :
//! a WebSocket front door that wires a [`state::AppState`] together and
//! drives one [`conductor_orchestrator::TurnRunner`] turn per inbound
//! message.
//!
//! Grounded on `crates/gateway/src/{main,state}.rs`'s struct-of-`Arc`s
//! wiring and `crates/gateway/src/nodes/ws.rs`'s hello/welcome/message-loop
//! shape, trimmed to the one channel and three payload shapes this spec
//! defines — no node mesh, no multi-channel identity, no admin API.

pub mod app;
pub mod cancel;
pub mod cli;
pub mod decision_prompt;
pub mod session_lock;
pub mod state;
pub mod turn;
pub mod ws;
