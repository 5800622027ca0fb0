//! Shared domain types for the marketing-automation orchestrator: the
//! session state machine, tool/plan/message shapes, and configuration.
//! Every other crate in the workspace depends on this one; it depends on
//! nothing in the workspace itself.

pub mod capability;
pub mod config;
pub mod error;
pub mod plan;
pub mod session;
pub mod stream;
pub mod tool;

pub use capability::{LlmCapabilities, ModelRole, ToolSupport};
pub use config::Config;
pub use error::{Error, Result};
pub use plan::{ActionType, IterateSource, Plan, PlannedCall, Proposal, ProposalField, Record};
pub use session::{
    CallStatus, EmailContent, ExecutionSummary, McpResult, NextAction, RecordRef, SessionContext,
    SessionState, ToolResult, PREVIOUS_RESULT,
};
pub use stream::{BoxStream, StreamEvent, Usage};
pub use tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
