//! The Session State : the single per-connection entity mutated by
//! each graph turn. Every mutation goes through a typed updater method —
//! never a blanket struct merge — so the merge/replace reducer split
//!  stays explicit and
//! auditable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::plan::{Plan, Proposal, Record};
use crate::tool::Message;

/// The routing label chosen by the Orchestrator Decision Node (C3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    Complete,
    /// `casual_chat:<utterance>` — a conversational reply, bypassing tools.
    CasualChat(String),
    /// A registered service name or specialized-workflow name.
    Route(String),
}

impl NextAction {
    /// Parse C3's raw label against the set of known service/workflow names.
    /// Unknown labels default to `Complete` ( validation rule).
    pub fn from_label(label: &str, known: &[&str]) -> Self {
        if label == "complete" {
            return Self::Complete;
        }
        if let Some(rest) = label.strip_prefix("casual_chat:") {
            return Self::CasualChat(rest.to_string());
        }
        if known.contains(&label) {
            return Self::Route(label.to_string());
        }
        Self::Complete
    }

    pub fn as_route(&self) -> Option<&str> {
        match self {
            Self::Route(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// `{record_id, name}` — a lightweight reference used in `created_records`
/// and `session_context`'s per-entity registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRef {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}

/// Per-session long-lived memory: the created-record registry (grouped by
/// entity type) and a running conversation summary. Unlike `created_records`
/// (turn-scoped, reset each turn), this survives across turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    pub created_record_registry: HashMap<String, Vec<RecordRef>>,
    pub conversation_summary: Option<String>,
}

/// One tool invocation's outcome, as recorded in `mcp_results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub request: serde_json::Value,
    #[serde(default)]
    pub response: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub status: CallStatus,
    #[serde(default)]
    pub source_item: Option<serde_json::Value>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Success,
    Error,
}

/// Aggregate stats for one planner/executor pass ( return shape).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total_calls: u32,
    pub successful_calls: u32,
    pub failed_calls: u32,
    pub iterations: u32,
}

/// What C11 reads per service to summarize the turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpResult {
    pub execution_summary: ExecutionSummary,
    pub tool_results: Vec<ToolResult>,
}

/// The drafted/refined email content the Email-Builder Agent (C8.4) holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailContent {
    pub subject: String,
    pub body_html: String,
    pub body_text: String,
    pub tone: String,
    pub suggested_audience: String,
}

/// The sentinel result-set name used for the "most recent rows" alias.
/// Ephemeral, never persisted beyond a turn.
pub const PREVIOUS_RESULT: &str = "previous_result";

/// The single per-client-connection entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub thread_id: String,

    pub user_goal: String,
    pub messages: Vec<Message>,

    pub iteration_count: u32,
    pub max_iterations: u32,

    pub next_action: Option<NextAction>,
    pub current_agent: Option<String>,

    /// Merged across nodes — accumulates observations.
    pub mcp_results: HashMap<String, McpResult>,

    /// Replaced wholesale on each update — the cross-step data plane.
    pub shared_result_sets: HashMap<String, Vec<Record>>,

    pub session_context: SessionContext,

    pub task_directive: Option<String>,
    pub pending_updates: Option<serde_json::Value>,

    /// Replaced wholesale — populated by the completion node for the client.
    pub created_records: HashMap<String, Vec<RecordRef>>,

    /// Scratch state for the specialized workflows, kept opaque here: each
    /// workflow module owns its own typed view over this `Value` so this
    /// crate does not need to depend on `conductor-orchestrator`.
    pub email_workflow_context: Option<serde_json::Value>,
    pub engagement_workflow_context: Option<serde_json::Value>,
    pub save_workflow_context: Option<serde_json::Value>,

    /// Sticky routing flag ( entry router).
    pub active_workflow: Option<String>,

    pub plan_override: Option<Plan>,
    pub pending_proposal_plan: Option<Plan>,
    pub pending_proposal_details: Option<Proposal>,

    pub workflow_failed: bool,

    pub error: Option<String>,
    pub final_response: Option<String>,

    /// `true` when this turn touched the CRM service (surfaced to the
    /// client as `salesforce_data` in the standard response).
    pub salesforce_data: bool,
    /// Transient per-turn scratch for the transactional-email service.
    pub brevo_results: Option<serde_json::Value>,
    /// Transient per-turn scratch for the URL-shortener service.
    pub linkly_links: Option<serde_json::Value>,

    /// Preserved across turns while a draft is in progress (C1 step 2).
    pub generated_email_content: Option<EmailContent>,
}

impl SessionState {
    pub fn new(thread_id: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_goal: String::new(),
            messages: Vec::new(),
            iteration_count: 0,
            max_iterations,
            next_action: None,
            current_agent: None,
            mcp_results: HashMap::new(),
            shared_result_sets: HashMap::new(),
            session_context: SessionContext::default(),
            task_directive: None,
            pending_updates: None,
            created_records: HashMap::new(),
            email_workflow_context: None,
            engagement_workflow_context: None,
            save_workflow_context: None,
            active_workflow: None,
            plan_override: None,
            pending_proposal_plan: None,
            pending_proposal_details: None,
            workflow_failed: false,
            error: None,
            final_response: None,
            salesforce_data: false,
            brevo_results: None,
            linkly_links: None,
            generated_email_content: None,
        }
    }

    // ── Typed updaters ──────────────────────────────────────────────

    /// Append-only message log.
    pub fn append_message(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn append_messages(&mut self, msgs: impl IntoIterator<Item = Message>) {
        self.messages.extend(msgs);
    }

    /// Merge reducer for `mcp_results` — accumulates per-service observations.
    pub fn merge_mcp_result(&mut self, service: impl Into<String>, result: McpResult) {
        let service = service.into();
        match self.mcp_results.get_mut(&service) {
            Some(existing) => {
                existing.tool_results.extend(result.tool_results);
                existing.execution_summary.total_calls += result.execution_summary.total_calls;
                existing.execution_summary.successful_calls +=
                    result.execution_summary.successful_calls;
                existing.execution_summary.failed_calls += result.execution_summary.failed_calls;
                existing.execution_summary.iterations += result.execution_summary.iterations;
            }
            None => {
                self.mcp_results.insert(service, result);
            }
        }
    }

    /// Replace reducer for `shared_result_sets` (invariant: not a deep-merge).
    pub fn replace_result_set(&mut self, name: impl Into<String>, records: Vec<Record>) {
        self.shared_result_sets.insert(name.into(), records);
    }

    /// Update the `previous_result` alias to the most recent rows.
    pub fn set_previous_result(&mut self, records: Vec<Record>) {
        self.replace_result_set(PREVIOUS_RESULT, records);
    }

    /// Replace reducer for `created_records` (C11 is the sole standard-path
    /// writer per).
    pub fn replace_created_records(&mut self, records: HashMap<String, Vec<RecordRef>>) {
        self.created_records = records;
    }

    pub fn add_created_record(&mut self, entity: impl Into<String>, record: RecordRef) {
        self.created_records.entry(entity.into()).or_default().push(record);
    }

    /// Invariant 1: increment, then force completion once the cap is hit.
    pub fn advance_iteration(&mut self) {
        self.iteration_count += 1;
        if self.iteration_count >= self.max_iterations {
            self.next_action = Some(NextAction::Complete);
            self.error = Some("iteration cap exceeded".into());
        }
    }

    pub fn at_iteration_cap(&self) -> bool {
        self.iteration_count >= self.max_iterations
    }

    /// Invariant 5: at most one of `{pending_proposal_plan, plan_override}`.
    pub fn set_pending_proposal(&mut self, plan: Plan, proposal: Proposal) {
        self.plan_override = None;
        self.pending_proposal_plan = Some(plan);
        self.pending_proposal_details = Some(proposal);
    }

    /// Invariant 3 + 5: resuming a proposal clears the pending-proposal slot
    /// and installs the (possibly edited) remaining plan as the override.
    pub fn resolve_proposal_into_override(&mut self, plan: Plan) {
        self.pending_proposal_plan = None;
        self.pending_proposal_details = None;
        self.plan_override = Some(plan);
    }

    /// Invariant 3: `plan_override` is consumed on the next execution of the
    /// generic caller.
    pub fn take_plan_override(&mut self) -> Option<Plan> {
        self.plan_override.take()
    }

    /// Set the sticky workflow flag ( entry router).
    pub fn set_active_workflow(&mut self, workflow: impl Into<String>) {
        self.active_workflow = Some(workflow.into());
    }

    /// Cleared only by the workflow's own exit logic (invariant 2), never by
    /// the orchestrator — callers outside a workflow's exit path must not
    /// call this.
    pub fn clear_active_workflow(&mut self) {
        self.active_workflow = None;
    }

    /// C1 step 2: the sanitized delta applied when starting a fresh turn
    /// (as opposed to resuming at an interrupt). Resets transient per-turn
    /// fields while preserving `messages`, `session_context`,
    /// `shared_result_sets`, the sticky `active_workflow` flag, and any
    /// in-progress `generated_email_content`.
    pub fn begin_new_turn(&mut self, user_goal: impl Into<String>) {
        self.user_goal = user_goal.into();
        self.final_response = None;
        self.error = None;
        self.next_action = None;
        self.mcp_results.clear();
        self.email_workflow_context = None;
        self.engagement_workflow_context = None;
        self.save_workflow_context = None;
        self.salesforce_data = false;
        self.brevo_results = None;
        self.linkly_links = None;
        self.created_records.clear();
        self.workflow_failed = false;
        self.iteration_count = 0;
        // generated_email_content, messages, session_context,
        // shared_result_sets and active_workflow are deliberately preserved.
    }

    /// Invariant 4: `previous_result` must not outlive the turn that
    /// produced it. Called once the graph settles, before the checkpoint is
    /// written back.
    pub fn end_turn_cleanup(&mut self) {
        self.shared_result_sets.remove(PREVIOUS_RESULT);
    }

    /// `created_records` filtered to exclude placeholder names (C1 step 3) —
    /// entries whose name looks like an unresolved `{{...}}` placeholder or
    /// is empty are dropped before being sent to the client.
    pub fn created_records_for_client(&self) -> HashMap<String, Vec<RecordRef>> {
        self.created_records
            .iter()
            .map(|(k, v)| {
                let filtered: Vec<RecordRef> = v
                    .iter()
                    .filter(|r| !r.name.is_empty() && !r.name.contains("{{"))
                    .cloned()
                    .collect();
                (k.clone(), filtered)
            })
            .filter(|(_, v)| !v.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_iteration_forces_complete_at_cap() {
        let mut s = SessionState::new("t1", 3);
        s.advance_iteration();
        s.advance_iteration();
        assert!(s.next_action.is_none());
        s.advance_iteration();
        assert_eq!(s.next_action, Some(NextAction::Complete));
        assert!(s.error.is_some());
    }

    #[test]
    fn advance_iteration_past_cap_sets_error() {
        let mut s = SessionState::new("t1", 0);
        s.advance_iteration();
        assert_eq!(s.next_action, Some(NextAction::Complete));
        assert!(s.error.is_some());
    }

    #[test]
    fn pending_proposal_clears_plan_override() {
        let mut s = SessionState::new("t1", 10);
        s.plan_override = Some(Plan::empty());
        s.set_pending_proposal(
            Plan::empty(),
            Proposal {
                object: "Campaign".into(),
                action_type: crate::plan::ActionType::Create,
                fields: vec![],
                contact_count: None,
                related_records: vec![],
                available_fields: vec![],
            },
);
        assert!(s.plan_override.is_none());
        assert!(s.pending_proposal_plan.is_some());
    }

    #[test]
    fn resolve_proposal_clears_pending_and_sets_override() {
        let mut s = SessionState::new("t1", 10);
        s.set_pending_proposal(
            Plan::empty(),
            Proposal {
                object: "Campaign".into(),
                action_type: crate::plan::ActionType::Create,
                fields: vec![],
                contact_count: None,
                related_records: vec![],
                available_fields: vec![],
            },
);
        s.resolve_proposal_into_override(Plan::empty());
        assert!(s.pending_proposal_plan.is_none());
        assert!(s.pending_proposal_details.is_none());
        assert!(s.plan_override.is_some());
    }

    #[test]
    fn begin_new_turn_resets_transient_preserves_sticky() {
        let mut s = SessionState::new("t1", 10);
        s.set_active_workflow("email_builder_agent");
        s.replace_result_set("contacts", vec![]);
        s.merge_mcp_result(
            "salesforce",
            McpResult {
                execution_summary: ExecutionSummary::default(),
                tool_results: vec![],
            },
);
        s.error = Some("boom".into());
        s.final_response = Some("done".into());

        s.begin_new_turn("do another thing");

        assert!(s.mcp_results.is_empty());
        assert!(s.error.is_none());
        assert!(s.final_response.is_none());
        assert_eq!(s.active_workflow.as_deref(), Some("email_builder_agent"));
        assert!(s.shared_result_sets.contains_key("contacts"));
    }

    #[test]
    fn end_turn_cleanup_strips_previous_result() {
        let mut s = SessionState::new("t1", 10);
        s.set_previous_result(vec![]);
        s.replace_result_set("contacts", vec![]);
        s.end_turn_cleanup();
        assert!(!s.shared_result_sets.contains_key(PREVIOUS_RESULT));
        assert!(s.shared_result_sets.contains_key("contacts"));
    }

    #[test]
    fn next_action_from_label_known_service() {
        let known = ["salesforce", "brevo", "linkly"];
        let action = NextAction::from_label("salesforce", &known);
        assert_eq!(action.as_route(), Some("salesforce"));
    }

    #[test]
    fn next_action_from_label_unknown_defaults_complete() {
        let known = ["salesforce"];
        let action = NextAction::from_label("made_up_service", &known);
        assert_eq!(action, NextAction::Complete);
    }

    #[test]
    fn next_action_from_label_casual_chat() {
        let action = NextAction::from_label("casual_chat:hi there", &[]);
        assert_eq!(action, NextAction::CasualChat("hi there".into()));
    }

    #[test]
    fn created_records_for_client_filters_placeholders() {
        let mut s = SessionState::new("t1", 10);
        s.add_created_record(
            "Campaign",
            RecordRef {
                id: "701x".into(),
                name: "Winter 2035".into(),
            },
);
        s.add_created_record(
            "Campaign",
            RecordRef {
                id: "701y".into(),
                name: "{{unresolved}}".into(),
            },
);
        let filtered = s.created_records_for_client();
        assert_eq!(filtered["Campaign"].len(), 1);
        assert_eq!(filtered["Campaign"][0].name, "Winter 2035");
    }

    #[test]
    fn merge_mcp_result_accumulates_across_calls() {
        let mut s = SessionState::new("t1", 10);
        let make = |n| McpResult {
            execution_summary: ExecutionSummary {
                total_calls: n,
                successful_calls: n,
                failed_calls: 0,
                iterations: 1,
            },
            tool_results: vec![],
        };
        s.merge_mcp_result("salesforce", make(2));
        s.merge_mcp_result("salesforce", make(3));
        let r = &s.mcp_results["salesforce"];
        assert_eq!(r.execution_summary.total_calls, 5);
        assert_eq!(r.execution_summary.iterations, 2);
    }
}
