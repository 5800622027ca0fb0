//! Turn Runner (C2): drives a `SessionState` through the
//! orchestration graph for one inbound turn, invoking each node's real work
//! (C3/C4/C8/C11) between `graph.rs`'s pure routing decisions until a
//! terminal node is reached.
//!
//! Grounded on `crates/gateway/src/runtime/turn.rs`'s `run_turn` shape: a
//! bounded `loop` driving node-by-node execution and returning a typed
//! outcome rather than threading results through a generic graph library.

pub mod completion;
pub mod decision;
pub mod dynamic_caller;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod placeholder;
pub mod planner;
pub mod transport;
pub mod workflows;

use std::sync::Arc;

use conductor_context::SchemaContextBuilder;
use conductor_domain::config::ServiceRegistryConfig;
use conductor_domain::session::SessionState;
use conductor_providers::LlmProvider;
use serde_json::Value;

use crate::completion::CompletionOutcome;
use crate::graph::GraphNode;
use crate::interrupt::ReviewProposalPayload;
use crate::transport::ToolTransport;

/// Hard cap on graph steps within a single turn, well above anything the
/// iteration cap on `orchestrator` lets through — a backstop against a
/// routing bug turning into an infinite loop rather than a real limit.
const MAX_GRAPH_STEPS: usize = 64;

const CAMPAIGN_RESULT_SET: &str = "campaign";

/// What a turn produces once it either finishes or suspends.
pub enum TurnOutcome {
    /// `final_response` is ready to send to the client; the turn is
    /// settled and the checkpoint can drop its transient fields.
    Response(String),
    /// Suspended at `review_proposal` — the client must answer before the
    /// turn can continue.
    ReviewProposal(ReviewProposalPayload),
    /// Suspended at a yes/no confirmation gate (currently only the
    /// save-template workflow's commit step).
    Confirmation { message: String, options: Vec<String> },
}

/// Everything one turn needs to drive every node: the service registry,
/// the two model roles (`planner` for routing/planning, `summarizer` for
/// casual chat and progress summaries), the tool transport, and the
/// optional schema-context builder wired in only for the CRM service.
pub struct TurnRunner<'a> {
    pub registry: &'a ServiceRegistryConfig,
    pub decision_prompt: &'a str,
    pub planner_provider: Arc<dyn LlmProvider>,
    pub summarizer_provider: Arc<dyn LlmProvider>,
    pub transport: &'a dyn ToolTransport,
    /// `Some` only when wired in for the CRM service; `None`
    /// elsewhere, since this crate ships no concrete `SchemaIndex`.
    pub schema_builder: Option<&'a SchemaContextBuilder>,
    pub schema_service_id: &'a str,
}

impl<'a> TurnRunner<'a> {
    /// Drive a brand-new turn: the entry router picks a sticky workflow or
    /// `orchestrator`, then the graph loop runs to a terminal node.
    pub async fn run_new_turn(&self, session: &mut SessionState) -> TurnOutcome {
        let node = graph::entry_node(session);
        self.drive(session, node).await
    }

    /// Resume a turn suspended at `review_proposal`: apply the
    /// answer, then re-enter `dynamic_caller` for whichever service the
    /// suspended turn was routed to. `dispatch::dispatch`'s `Resume` branch
    /// never calls `begin_new_turn`, so `session.next_action` still holds
    /// the `Route(service_id)` from before the suspension.
    pub async fn resume_review_proposal(&self, session: &mut SessionState, answer: &str) -> TurnOutcome {
        if interrupt::resume_review_proposal(session, answer).is_none() {
            return TurnOutcome::Response("There was nothing pending to review.".to_string());
        }
        match session.next_action.as_ref().and_then(|a| a.as_route()) {
            Some(_) => self.drive(session, GraphNode::DynamicCaller).await,
            None => {
                let message = "I lost track of which service this belonged to — please try again.".to_string();
                session.final_response = Some(message.clone());
                TurnOutcome::Response(message)
            }
        }
    }

    /// Resume a turn suspended at the save-template confirmation gate.
    /// That workflow is terminal in the graph, so resuming it ends the
    /// turn directly.
    pub async fn resume_confirmation(&self, session: &mut SessionState, answer: &str) -> TurnOutcome {
        workflows::save_template::resume_save_template_workflow(session, self.transport, answer).await;
        TurnOutcome::Response(session.final_response.clone().unwrap_or_default())
    }

    async fn drive(&self, session: &mut SessionState, mut node: GraphNode) -> TurnOutcome {
        for _ in 0..MAX_GRAPH_STEPS {
            tracing::debug!(thread_id = %session.thread_id, node = ?node, "turn runner visiting node");

            match node {
                GraphNode::Orchestrator => {
                    let (next_action, casual_reply) = decision::decide_next_action(
                        session,
                        self.registry,
                        self.decision_prompt,
                        self.planner_provider.clone(),
)
                    .await;
                    session.next_action = Some(next_action);
                    if let Some(reply) = casual_reply {
                        session.final_response = Some(reply);
                    }
                    node = graph::route_from_orchestrator(session);
                }

                GraphNode::DynamicCaller => {
                    let Some(service_id) =
                        session.next_action.as_ref().and_then(|a| a.as_route()).map(str::to_string)
                    else {
                        session.final_response =
                            Some("I couldn't determine which service to use for that.".to_string());
                        node = GraphNode::Completion;
                        continue;
                    };
                    let Some(service) = self.registry.find(&service_id).cloned() else {
                        session.final_response = Some(format!("\"{service_id}\" isn't a registered service."));
                        node = GraphNode::Completion;
                        continue;
                    };
                    let schema_builder =
                        if service.id == self.schema_service_id { self.schema_builder } else { None };

                    dynamic_caller::run_dynamic_caller(
                        &service,
                        session,
                        Some(self.planner_provider.clone()),
                        self.transport,
                        schema_builder,
)
                    .await;
                    node = graph::route_from_dynamic_caller(session);
                }

                GraphNode::ReviewProposal => {
                    let payload = interrupt::build_review_proposal_payload(session)
                        .expect("review_proposal node reached without a pending proposal");
                    return TurnOutcome::ReviewProposal(payload);
                }

                GraphNode::EngagementWorkflow => {
                    workflows::engagement::run_engagement_workflow(session, self.transport).await;
                    node = GraphNode::Orchestrator;
                }

                GraphNode::EmailWorkflow => {
                    workflows::email_send::run_email_send_workflow(session, self.transport).await;
                    node = GraphNode::Orchestrator;
                }

                GraphNode::EmailBuilderAgent => {
                    let other_services = self.registry.names();
                    let save_intent = workflows::email_builder::run_email_builder_agent(
                        session,
                        self.planner_provider.clone(),
                        &other_services,
)
                    .await;
                    node = graph::route_from_email_builder_agent(save_intent);
                    if node == GraphNode::Completion {
                        // Every path through the builder that doesn't hand
                        // off to the save-template workflow already set
                        // `final_response` itself (exit, draft, or error).
                        return TurnOutcome::Response(session.final_response.clone().unwrap_or_default());
                    }
                }

                GraphNode::SaveTemplateWorkflow => {
                    let Some(campaign_id) = resolve_campaign_id(session) else {
                        workflows::fail(
                            session,
                            "I don't have a campaign selected to save this template against.",
);
                        return save_template_outcome(session);
                    };
                    workflows::save_template::run_save_template_workflow(session, self.transport, &campaign_id)
                        .await;
                    return save_template_outcome(session);
                }

                GraphNode::Completion => {
                    return match completion::run_completion(session, self.summarizer_provider.clone()).await {
                        CompletionOutcome::Response(text) => {
                            session.final_response = Some(text.clone());
                            TurnOutcome::Response(text)
                        }
                        CompletionOutcome::Proposal(payload) => TurnOutcome::ReviewProposal(payload),
                    };
                }
            }
        }

        let message = "This turn took too many steps and was stopped.".to_string();
        session.final_response = Some(message.clone());
        TurnOutcome::Response(message)
    }
}

/// The campaign the save-template workflow commits the template reference
/// against  — resolved the same way `engagement.rs`'s "this
/// campaign" phrase is, from the shared `campaign` result set.
fn resolve_campaign_id(session: &SessionState) -> Option<String> {
    session
        .shared_result_sets
        .get(CAMPAIGN_RESULT_SET)
        .and_then(|rows| rows.first())
        .and_then(|record| record.get("Id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn save_template_outcome(session: &SessionState) -> TurnOutcome {
    if let Some(ctx) = &session.save_workflow_context {
        if ctx.get("awaiting_confirmation").and_then(Value::as_bool).unwrap_or(false) {
            let message = ctx.get("message").and_then(Value::as_str).unwrap_or_default().to_string();
            let options = ctx
                .get("options")
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            return TurnOutcome::Confirmation { message, options };
        }
    }
    TurnOutcome::Response(session.final_response.clone().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::{outcome_rows, FakeTransport};
    use async_trait::async_trait;
    use conductor_domain::capability::LlmCapabilities;
    use conductor_domain::config::{PlanningStrategy, ServiceConfig};
    use conductor_domain::stream::{BoxStream, StreamEvent};
    use conductor_providers::{ChatRequest, ChatResponse};
    use std::sync::Mutex;

    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
        capabilities: LlmCapabilities,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(String::from).rev().collect()),
                capabilities: LlmCapabilities::default(),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, _req: ChatRequest) -> conductor_domain::error::Result<ChatResponse> {
            let content = self.responses.lock().unwrap().pop().unwrap_or_else(|| "complete".into());
            Ok(ChatResponse {
                content,
                tool_calls: vec![],
                usage: None,
                model: "fake".into(),
                finish_reason: Some("stop".into()),
            })
        }
        async fn chat_stream(
            &self,
            _req: ChatRequest,
) -> conductor_domain::error::Result<BoxStream<'static, conductor_domain::error::Result<StreamEvent>>> {
            unimplemented!("not used by the turn runner")
        }
        async fn embeddings(
            &self,
            _req: conductor_providers::EmbeddingsRequest,
) -> conductor_domain::error::Result<conductor_providers::EmbeddingsResponse> {
            unimplemented!("not used by the turn runner")
        }
        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }
        fn provider_id(&self) -> &str {
            "fake"
        }
    }

    fn registry() -> ServiceRegistryConfig {
        ServiceRegistryConfig {
            services: vec![ServiceConfig {
                id: "salesforce".into(),
                description: "CRM".into(),
                planning_strategy: PlanningStrategy::InternalTool,
                planning_tool_name: Some("plan_crm_calls".into()),
                planning_prompt_template: None,
                required_context: vec![],
            }],
        }
    }

    #[tokio::test]
    async fn casual_chat_short_circuits_straight_to_a_response() {
        let registry = registry();
        let transport = FakeTransport::new();
        let provider: Arc<dyn LlmProvider> =
            Arc::new(ScriptedProvider::new(vec!["casual_chat:hello there", "Hi! How can I help?"]));

        let runner = TurnRunner {
            registry: &registry,
            decision_prompt: "route the user's goal",
            planner_provider: provider.clone(),
            summarizer_provider: provider,
            transport: &transport,
            schema_builder: None,
            schema_service_id: "salesforce",
        };

        let mut session = SessionState::new("t1", 10);
        session.user_goal = "hey, how's it going".into();

        match runner.run_new_turn(&mut session).await {
            TurnOutcome::Response(text) => assert_eq!(text, "Hi! How can I help?"),
            _ => panic!("expected a plain response"),
        }
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn unsafe_dynamic_call_suspends_with_a_review_proposal() {
        let registry = registry();
        let transport = FakeTransport::new()
            .with_def("salesforce", conductor_domain::tool::ToolDefinition {
                name: "plan_crm_calls".into(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            })
            .with_def("salesforce", conductor_domain::tool::ToolDefinition {
                name: "update_contact".into(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            });
        transport.push_response(
            "plan_crm_calls",
            outcome_rows(vec![serde_json::json!({
                "calls": [{"tool": "update_contact", "arguments": {"Id": "003A", "Status": "Active"}}],
                "needs_next_iteration": false
            })]),
);

        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new(vec!["salesforce"]));
        let runner = TurnRunner {
            registry: &registry,
            decision_prompt: "route the user's goal",
            planner_provider: provider.clone(),
            summarizer_provider: provider,
            transport: &transport,
            schema_builder: None,
            schema_service_id: "salesforce",
        };

        let mut session = SessionState::new("t1", 10);
        session.user_goal = "mark Ada as active".into();

        match runner.run_new_turn(&mut session).await {
            TurnOutcome::ReviewProposal(payload) => assert_eq!(payload.proposal.object, "Contact"),
            _ => panic!("expected a review proposal suspension"),
        }
        assert!(session.pending_proposal_plan.is_some());

        match runner.resume_review_proposal(&mut session, "yes").await {
            TurnOutcome::Response(_) => {}
            _ => panic!("expected the resumed call to complete"),
        }
        assert!(session.pending_proposal_plan.is_none());
        assert_eq!(transport.call_count(), 2, "plan_crm_calls, then the approved update_contact");
    }

    #[tokio::test]
    async fn iteration_cap_forces_completion_without_visiting_any_service() {
        let registry = registry();
        let transport = FakeTransport::new();
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new(vec!["Done for now."]));

        let runner = TurnRunner {
            registry: &registry,
            decision_prompt: "route the user's goal",
            planner_provider: provider.clone(),
            summarizer_provider: provider,
            transport: &transport,
            schema_builder: None,
            schema_service_id: "salesforce",
        };

        let mut session = SessionState::new("t1", 1);
        session.user_goal = "do a bunch of CRM work".into();

        match runner.run_new_turn(&mut session).await {
            TurnOutcome::Response(_) => {}
            _ => panic!("expected the iteration cap to force a response"),
        }
        assert_eq!(transport.call_count(), 0);
    }
}
