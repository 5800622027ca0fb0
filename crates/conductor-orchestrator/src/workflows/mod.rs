//! Specialized Workflows (C8): deterministic multi-stage
//! pipelines that replace the generic planner loop for known flows. Each
//! calls the Tool Transport Adapter directly, in a fixed order, and reports
//! through the same `mcp_results` channel as the generic loop so the
//! completion node can summarize them uniformly.
//!
//! Follows `dynamic_caller.rs`'s pattern of wrapping a transport outcome as
//! a `ToolResult` and merging it into `mcp_results`.

pub mod email_builder;
pub mod email_send;
pub mod engagement;
pub mod save_template;

use conductor_domain::session::{CallStatus, ExecutionSummary, McpResult, SessionState, ToolResult};
use serde_json::Value;

use crate::transport::{ToolOutcome, ToolTransport};

/// Call one tool directly against the transport and fold the outcome into
/// `mcp_results` under `service`, exactly as the generic loop does. Returns
/// the normalized outcome so the workflow can keep driving its own stages.
pub(crate) async fn call_and_record(
    session: &mut SessionState,
    transport: &dyn ToolTransport,
    service: &str,
    tool: &str,
    arguments: Value,
) -> ToolOutcome {
    let outcome = match transport.call_tool(service, tool, arguments.clone()).await {
        Ok(outcome) => outcome,
        Err(e) => ToolOutcome {
            rows: None,
            is_error: true,
            error_message: Some(e.to_string()),
            raw_text: e.to_string(),
        },
    };

    let tool_result = ToolResult {
        tool_name: tool.to_string(),
        request: arguments,
        response: outcome.rows.clone().map(Value::Array),
        error: outcome.error_message.clone(),
        status: if outcome.is_error { CallStatus::Error } else { CallStatus::Success },
        source_item: None,
        batch_size: None,
    };

    let summary = ExecutionSummary {
        total_calls: 1,
        successful_calls: if outcome.is_error { 0 } else { 1 },
        failed_calls: u32::from(outcome.is_error),
        iterations: 1,
    };

    session.merge_mcp_result(
        service.to_string(),
        McpResult { execution_summary: summary, tool_results: vec![tool_result] },
);
    outcome
}

/// Short-circuit a workflow on failure: sets `error` and `workflow_failed`,
/// short-circuiting later steps.
pub(crate) fn fail(session: &mut SessionState, message: impl Into<String>) {
    let message = message.into();
    session.workflow_failed = true;
    session.error = Some(message.clone());
    session.final_response = Some(message);
}

/// Case-insensitive field lookup against a plain record, the repeated
/// primitive behind every workflow's field-matching (template params,
/// campaign-member maps, ...).
pub(crate) fn get_ci<'a>(record: &'a conductor_domain::plan::Record, key: &str) -> Option<&'a Value> {
    record.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v)
}

pub(crate) fn get_ci_str(record: &conductor_domain::plan::Record, key: &str) -> Option<String> {
    get_ci(record, key).and_then(Value::as_str).map(str::to_string)
}
