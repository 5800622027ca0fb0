//! Orchestration Graph (C2): the node set and edge rules as pure
//! routing functions over `SessionState`. The turn runner (in `lib.rs`)
//! drives these decisions, invoking each node's actual work (C3/C4/C8/C11)
//! between them.

use conductor_domain::session::{NextAction, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphNode {
    Orchestrator,
    DynamicCaller,
    ReviewProposal,
    Completion,
    EmailWorkflow,
    EngagementWorkflow,
    EmailBuilderAgent,
    SaveTemplateWorkflow,
}

/// The two sticky-workflow names the entry router recognizes (
/// "entry router").
const STICKY_WORKFLOWS: &[(&str, GraphNode)] = &[
    ("email_builder_agent", GraphNode::EmailBuilderAgent),
    ("save_template_workflow", GraphNode::SaveTemplateWorkflow),
];

/// Entry router: picks the sticky workflow named by `active_workflow`, else
/// `orchestrator`.
pub fn entry_node(session: &SessionState) -> GraphNode {
    if let Some(active) = &session.active_workflow {
        for (name, node) in STICKY_WORKFLOWS {
            if active == name {
                return *node;
            }
        }
    }
    GraphNode::Orchestrator
}

/// `orchestrator`'s outgoing edge, keyed on `next_action` . Also
/// advances `iteration_count`, forcing completion at the cap.
pub fn route_from_orchestrator(session: &mut SessionState) -> GraphNode {
    session.advance_iteration();
    if session.at_iteration_cap() {
        return GraphNode::Completion;
    }

    match session.next_action.clone() {
        Some(NextAction::Complete) | None => GraphNode::Completion,
        Some(NextAction::CasualChat(_)) => GraphNode::Completion,
        Some(NextAction::Route(label)) => match label.as_str() {
            "EngagementWorkflow" => GraphNode::EngagementWorkflow,
            "EmailBuilderAgent" => GraphNode::EmailBuilderAgent,
            "email_workflow" => GraphNode::EmailWorkflow,
            _ => GraphNode::DynamicCaller,
        },
    }
}

/// `dynamic_caller`'s outgoing edge: `review_proposal` when a mutating
/// proposal needs approval, `orchestrator` otherwise (loop).
pub fn route_from_dynamic_caller(session: &SessionState) -> GraphNode {
    if session.pending_proposal_plan.is_some() {
        GraphNode::ReviewProposal
    } else {
        GraphNode::Orchestrator
    }
}

/// Every specialized workflow loops back to `orchestrator`, except
/// `email_builder_agent`, whose internal router may hand off to
/// `save_template_workflow` on a save intent, and `save_template_workflow`
/// itself, which is terminal.
pub fn route_from_email_builder_agent(save_intent_detected: bool) -> GraphNode {
    if save_intent_detected {
        GraphNode::SaveTemplateWorkflow
    } else {
        GraphNode::Completion
    }
}

pub fn is_terminal(node: GraphNode) -> bool {
    matches!(node, GraphNode::SaveTemplateWorkflow | GraphNode::Completion)
}
