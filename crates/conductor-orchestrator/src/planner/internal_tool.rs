//! Internal-tool planning strategy (C5.1): a single registered
//! "planning tool" returns the entire plan up front; calls execute safe ones
//! immediately, and stop at the first unsafe (mutating) call to hand off to
//! the human-in-the-loop proposal flow.

use std::collections::HashMap;

use conductor_domain::plan::{PlannedCall, Plan, Proposal};
use conductor_domain::session::ToolResult;
use serde_json::Value;

use crate::planner::exec::execute_one_call;
use crate::transport::ToolTransport;

/// Mutating verbs that gate a call behind human approval. Matched as a
/// substring of the tool name, case-insensitively.
const UNSAFE_VERBS: &[&str] = &["create", "update", "delete", "upsert"];

pub fn is_unsafe_call(tool_name: &str) -> bool {
    let lower = tool_name.to_ascii_lowercase();
    UNSAFE_VERBS.iter().any(|v| lower.contains(v))
}

/// Outcome of one `call_internal_tool_plan` invocation.
pub enum InternalToolOutcome {
    /// Every call in the plan executed (none were unsafe, or none remained).
    Completed { tool_results: Vec<ToolResult> },
    /// Execution stopped before an unsafe call; the remaining plan (the
    /// unsafe call and everything after it) is handed to the proposal flow.
    Proposal {
        tool_results: Vec<ToolResult>,
        proposal: Proposal,
        remaining_plan: Plan,
    },
}

/// Irregular plurals for the `store_as` derivation heuristic (
/// "derived result-set name"); anything not listed falls back to `+s`.
const IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("company", "companies"),
    ("opportunity", "opportunities"),
    ("activity", "activities"),
    ("person", "people"),
    ("category", "categories"),
];

/// Best-effort pluralization of a tool's object noun when a call has no
/// explicit `store_as`, e.g. `query_contact` -> `contacts`.
pub fn derive_store_as(tool_name: &str) -> String {
    let noun = tool_name
        .trim_start_matches("query_")
        .trim_start_matches("get_")
        .trim_start_matches("list_")
        .trim_start_matches("search_");
    let lower = noun.to_ascii_lowercase();
    for (singular, plural) in IRREGULAR_PLURALS {
        if lower == *singular {
            return plural.to_string();
        }
    }
    if lower.ends_with('s') {
        lower
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{lower}s")
    }
}

fn store_as_for(call: &PlannedCall) -> String {
    call.store_as.clone().unwrap_or_else(|| derive_store_as(&call.tool))
}

/// Execute a plan returned by the internal planning tool, running safe calls
/// immediately and stopping at the first unsafe one.
pub async fn run_internal_tool_plan(
    service_id: &str,
    plan: Plan,
    transport: &dyn ToolTransport,
    result_sets: &mut HashMap<String, Vec<conductor_domain::plan::Record>>,
) -> InternalToolOutcome {
    let mut tool_results = Vec::new();

    for (idx, call) in plan.calls.iter().enumerate() {
        if is_unsafe_call(&call.tool) {
            let proposal = build_proposal(call);
            let remaining_plan = Plan {
                calls: plan.calls[idx..].to_vec(),
                needs_next_iteration: plan.needs_next_iteration,
                needs_salesforce_data: plan.needs_salesforce_data,
            };
            return InternalToolOutcome::Proposal { tool_results, proposal, remaining_plan };
        }

        let mut call = call.clone();
        if call.store_as.is_none() {
            call.store_as = Some(store_as_for(&call));
        }
        let results = execute_one_call(service_id, &call, transport, result_sets).await;
        tool_results.extend(results);
    }

    InternalToolOutcome::Completed { tool_results }
}

/// Build the human-review proposal for the first unsafe call (
/// "proposal construction"). Field labels default to the raw key since the
/// planning tool's schema (not available here) is the only source of
/// display-friendly labels; callers that have schema context may enrich
/// these fields before presenting them.
fn build_proposal(call: &PlannedCall) -> Proposal {
    use conductor_domain::plan::{ActionType, ProposalField};

    let action_type = if call.tool.to_ascii_lowercase().contains("delete") {
        ActionType::Delete
    } else if call.tool.to_ascii_lowercase().contains("upsert") {
        ActionType::Upsert
    } else if call.tool.to_ascii_lowercase().contains("update") {
        ActionType::Update
    } else {
        ActionType::Create
    };

    let fields = call
        .arguments
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| ProposalField {
                    name: k.clone(),
                    value: v.clone(),
                    label: k.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    Proposal {
        object: call.tool.clone(),
        action_type,
        fields,
        contact_count: None,
        related_records: vec![],
        available_fields: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::{outcome_rows, FakeTransport};
    use conductor_domain::tool::ToolDefinition;

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: String::new(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    fn call(tool_name: &str) -> PlannedCall {
        PlannedCall {
            tool: tool_name.into(),
            arguments: serde_json::json!({"Email": "a@x.com"}),
            reason: String::new(),
            store_as: None,
            iterate_over: None,
        }
    }

    #[test]
    fn unsafe_verbs_are_detected_case_insensitively() {
        assert!(is_unsafe_call("Update_Contact"));
        assert!(is_unsafe_call("create_lead"));
        assert!(is_unsafe_call("batch_upsert_records"));
        assert!(!is_unsafe_call("query_contacts"));
    }

    #[test]
    fn derive_store_as_pluralizes_common_and_irregular_nouns() {
        assert_eq!(derive_store_as("query_contact"), "contacts");
        assert_eq!(derive_store_as("query_company"), "companies");
        assert_eq!(derive_store_as("get_opportunity"), "opportunities");
    }

    #[tokio::test]
    async fn safe_calls_execute_and_unsafe_call_halts_with_a_proposal() {
        let transport = FakeTransport::new().with_def("salesforce", tool("query_contact"));
        transport.push_response("query_contact", outcome_rows(vec![serde_json::json!({"Id": "1"})]));

        let plan = Plan {
            calls: vec![call("query_contact"), call("update_contact"), call("send_email")],
            needs_next_iteration: false,
            needs_salesforce_data: None,
        };
        let mut sets = HashMap::new();
        let outcome = run_internal_tool_plan("salesforce", plan, &transport, &mut sets).await;
        match outcome {
            InternalToolOutcome::Proposal { tool_results, proposal, remaining_plan } => {
                assert_eq!(tool_results.len(), 1);
                assert_eq!(proposal.object, "update_contact");
                assert_eq!(remaining_plan.calls.len(), 2);
            }
            InternalToolOutcome::Completed { .. } => panic!("expected a proposal outcome"),
        }
    }

    #[tokio::test]
    async fn all_safe_plan_completes_without_a_proposal() {
        let transport = FakeTransport::new().with_def("salesforce", tool("query_contact"));
        transport.push_response("query_contact", outcome_rows(vec![]));
        let plan = Plan {
            calls: vec![call("query_contact")],
            needs_next_iteration: false,
            needs_salesforce_data: None,
        };
        let mut sets = HashMap::new();
        let outcome = run_internal_tool_plan("salesforce", plan, &transport, &mut sets).await;
        assert!(matches!(outcome, InternalToolOutcome::Completed { .. }));
    }
}
