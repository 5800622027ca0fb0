//! Generic Dynamic Caller (C4): given `next_action = serviceName`,
//! resolves the service config and drives the Planner/Executor Loop (C5),
//! then folds whichever of the three outcomes it produced back into the
//! Session State.

use std::sync::Arc;

use conductor_context::SchemaContextBuilder;
use conductor_domain::config::ServiceConfig;
use conductor_domain::session::{CallStatus, ExecutionSummary, McpResult, SessionState};
use conductor_providers::LlmProvider;
use serde_json::Value;

use crate::planner::{call_mcp_v2, LlmPlannerContext, PlannerOutcome};
use crate::transport::ToolTransport;

/// Resolve `required_context` paths into a single JSON object for the
/// llm_planner "available-context block" ( step 2). Paths are
/// dotted, rooted at the Session State's JSON representation; unresolvable
/// paths are simply omitted.
fn resolve_available_context(service: &ServiceConfig, session: &SessionState) -> Value {
    let state_json = serde_json::to_value(session).unwrap_or(Value::Null);
    let mut out = serde_json::Map::new();
    for path in &service.required_context {
        if let Some(v) = resolve_path(&state_json, path) {
            out.insert(path.clone(), v);
        }
    }
    Value::Object(out)
}

fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Drive one service turn and apply its outcome to `session`. Returns
/// `true` when the caller should route to `review_proposal` next (outcome
/// 1); `false` means the caller returns to `orchestrator` (outcomes 2/3,
/// which are both terminal-for-this-node from the graph's perspective).
///
/// `schema_builder` is only `Some` for the CRM service — the turn runner
/// wires it in for that service's config and leaves it `None` for every
/// other service.
pub async fn run_dynamic_caller(
    service: &ServiceConfig,
    session: &mut SessionState,
    provider: Option<Arc<dyn LlmProvider>>,
    transport: &dyn ToolTransport,
    schema_builder: Option<&SchemaContextBuilder>,
) -> bool {
    let plan_override = session.take_plan_override();
    let resuming_override = plan_override.is_some();

    let schema_context = match schema_builder {
        Some(builder) => builder.build(&session.user_goal, chrono::Utc::now(), None).await.0,
        None => String::new(),
    };

    let available_context = resolve_available_context(service, session);
    let llm_ctx = LlmPlannerContext {
        user_goal: &session.user_goal,
        task_directive: session.task_directive.as_deref(),
        schema_context: &schema_context,
        workflow_context: session.active_workflow.as_deref(),
        available_context: &available_context,
    };

    let mut result_sets = session.shared_result_sets.clone();
    let outcome = call_mcp_v2(service, plan_override, llm_ctx, provider, transport, &mut result_sets).await;

    match outcome {
        PlannerOutcome::Proposal { tool_results, proposal, remaining_plan } => {
            for (name, records) in result_sets {
                session.replace_result_set(name, records);
            }
            session.set_pending_proposal(remaining_plan, proposal);
            let summary = McpResult {
                execution_summary: summarize(&tool_results),
                tool_results,
            };
            session.merge_mcp_result(service.id.clone(), summary);
            true
        }
        PlannerOutcome::Completed { tool_results, iterations } => {
            for (name, records) in result_sets {
                session.replace_result_set(name, records);
            }
            let mut execution_summary = summarize(&tool_results);
            execution_summary.iterations = iterations;
            session.merge_mcp_result(service.id.clone(), McpResult { execution_summary, tool_results });
            if resuming_override {
                // plan_override was already consumed by take_plan_override above.
            }
            session.append_message(conductor_domain::tool::Message::assistant(format!(
                "Finished working with {}.",
                service.id
)));
            false
        }
    }
}

fn summarize(tool_results: &[conductor_domain::session::ToolResult]) -> ExecutionSummary {
    let total = tool_results.len() as u32;
    let failed = tool_results.iter().filter(|r| r.status == CallStatus::Error).count() as u32;
    ExecutionSummary {
        total_calls: total,
        successful_calls: total - failed,
        failed_calls: failed,
        iterations: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::{outcome_rows, FakeTransport};
    use conductor_domain::config::PlanningStrategy;
    use conductor_domain::tool::ToolDefinition;

    fn service(strategy: PlanningStrategy) -> ServiceConfig {
        ServiceConfig {
            id: "salesforce".into(),
            description: String::new(),
            planning_strategy: strategy,
            planning_tool_name: Some("plan_crm_calls".into()),
            planning_prompt_template: None,
            required_context: vec![],
        }
    }

    #[tokio::test]
    async fn completed_outcome_merges_results_and_appends_a_summary_message() {
        let transport = FakeTransport::new()
            .with_def("salesforce", ToolDefinition {
                name: "plan_crm_calls".into(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            });
        transport.push_response(
            "plan_crm_calls",
            outcome_rows(vec![serde_json::json!({"calls": [], "needs_next_iteration": false})]),
);

        let mut session = SessionState::new("t1", 10);
        let before = session.messages.len();
        let routed_to_review = run_dynamic_caller(
            &service(PlanningStrategy::InternalTool),
            &mut session,
            None,
            &transport,
            None,
)
        .await;

        assert!(!routed_to_review);
        assert!(session.messages.len() > before);
        assert!(session.mcp_results.contains_key("salesforce"));
    }

    #[tokio::test]
    async fn proposal_outcome_sets_pending_proposal_and_routes_to_review() {
        let transport = FakeTransport::new()
            .with_def("salesforce", ToolDefinition {
                name: "plan_crm_calls".into(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            })
            .with_def("salesforce", ToolDefinition {
                name: "update_contact".into(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            });
        transport.push_response(
            "plan_crm_calls",
            outcome_rows(vec![serde_json::json!({
                "calls": [{"tool": "update_contact", "arguments": {"Id": "1"}}],
                "needs_next_iteration": false
            })]),
);

        let mut session = SessionState::new("t1", 10);
        let routed_to_review = run_dynamic_caller(
            &service(PlanningStrategy::InternalTool),
            &mut session,
            None,
            &transport,
            None,
)
        .await;

        assert!(routed_to_review);
        assert!(session.pending_proposal_plan.is_some());
        assert!(session.pending_proposal_details.is_some());
    }

    #[tokio::test]
    async fn plan_override_executes_directly_and_clears_the_override() {
        let transport = FakeTransport::new().with_def(
            "salesforce",
            ToolDefinition {
                name: "update_contact".into(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            },
);
        transport.push_response("update_contact", outcome_rows(vec![serde_json::json!({"Id": "1"})]));

        let mut session = SessionState::new("t1", 10);
        session.resolve_proposal_into_override(conductor_domain::plan::Plan {
            calls: vec![conductor_domain::plan::PlannedCall {
                tool: "update_contact".into(),
                arguments: serde_json::json!({"Id": "1"}),
                reason: String::new(),
                store_as: None,
                iterate_over: None,
            }],
            needs_next_iteration: false,
            needs_salesforce_data: None,
        });

        let routed_to_review = run_dynamic_caller(
            &service(PlanningStrategy::InternalTool),
            &mut session,
            None,
            &transport,
            None,
)
        .await;

        assert!(!routed_to_review);
        assert!(session.plan_override.is_none());
        assert_eq!(transport.call_count(), 1);
    }
}
