//! New-turn vs. resume-after-interrupt detection.
//!
//! The graph itself has no notion of "is this session suspended" — that's a
//! Session Manager concern, reconstructed from the checkpoint's own fields
//! rather than a separate flag, per the design note in SPEC_FULL.md: model
//! the continuation as "a token the session manager stores on the checkpoint
//! until the next client message," realized here as plain inspection of
//! [`conductor_domain::session::SessionState`].

use conductor_domain::session::SessionState;

/// Which control payload the previous turn suspended at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingInterrupt {
    /// Suspended in `review_proposal` .
    ReviewProposal,
    /// Suspended in the save-template workflow's yes/no gate.
    Confirmation,
}

/// The outcome of dispatching one inbound message against a checkpoint.
#[derive(Debug, Clone)]
pub enum DispatchedTurn {
    /// No interrupt was pending: `state` already has `begin_new_turn` applied
    /// and the inbound message appended as a `Human` entry.
    NewTurn(SessionState),
    /// An interrupt was pending: `state` is unchanged except for the
    /// freshly-appended inbound message; `answer` is the raw text to resume
    /// the suspended node with, and `kind` names which control payload it
    /// answers.
    Resume {
        state: SessionState,
        kind: PendingInterrupt,
        answer: String,
    },
}

/// Detect whether `state` is currently suspended at an interrupt.
///
/// `review_proposal` leaves both `pending_proposal_plan` and
/// `pending_proposal_details` set (invariant 5 guarantees `plan_override` is
/// clear whenever these are). The save-template workflow's confirmation gate
/// has no dedicated field on `SessionState` — it stashes a marker in its own
/// scratch context, `save_workflow_context`, which this crate does not
/// otherwise interpret.
pub fn pending_interrupt(state: &SessionState) -> Option<PendingInterrupt> {
    if state.pending_proposal_plan.is_some() && state.pending_proposal_details.is_some() {
        return Some(PendingInterrupt::ReviewProposal);
    }
    if let Some(ctx) = &state.save_workflow_context {
        let awaiting = ctx
            .get("awaiting_confirmation")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if awaiting {
            return Some(PendingInterrupt::Confirmation);
        }
    }
    None
}

/// Dispatch one inbound message against `state` ( steps 1-2).
pub fn dispatch(mut state: SessionState, message: &str) -> DispatchedTurn {
    if let Some(kind) = pending_interrupt(&state) {
        state.append_message(conductor_domain::tool::Message::user(message));
        return DispatchedTurn::Resume {
            state,
            kind,
            answer: message.to_string(),
        };
    }

    state.begin_new_turn(message);
    state.append_message(conductor_domain::tool::Message::user(message));
    DispatchedTurn::NewTurn(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_domain::plan::{ActionType, Plan, Proposal};

    fn proposal() -> Proposal {
        Proposal {
            object: "Campaign".into(),
            action_type: ActionType::Create,
            fields: vec![],
            contact_count: None,
            related_records: vec![],
            available_fields: vec![],
        }
    }

    #[test]
    fn no_pending_interrupt_starts_new_turn() {
        let state = SessionState::new("t1", 10);
        match dispatch(state, "create a campaign") {
            DispatchedTurn::NewTurn(s) => {
                assert_eq!(s.user_goal, "create a campaign");
                assert_eq!(s.messages.len(), 1);
            }
            DispatchedTurn::Resume { .. } => panic!("expected a new turn"),
        }
    }

    #[test]
    fn pending_proposal_resumes_as_review_proposal() {
        let mut state = SessionState::new("t1", 10);
        state.set_pending_proposal(Plan::empty(), proposal());
        match dispatch(state, "yes") {
            DispatchedTurn::Resume { kind, answer, .. } => {
                assert_eq!(kind, PendingInterrupt::ReviewProposal);
                assert_eq!(answer, "yes");
            }
            DispatchedTurn::NewTurn(_) => panic!("expected a resume"),
        }
    }

    #[test]
    fn save_workflow_awaiting_confirmation_resumes_as_confirmation() {
        let mut state = SessionState::new("t1", 10);
        state.save_workflow_context = Some(serde_json::json!({"awaiting_confirmation": true}));
        match dispatch(state, "no") {
            DispatchedTurn::Resume { kind, .. } => {
                assert_eq!(kind, PendingInterrupt::Confirmation);
            }
            DispatchedTurn::NewTurn(_) => panic!("expected a resume"),
        }
    }

    #[test]
    fn new_turn_preserves_sticky_workflow_and_result_sets() {
        let mut state = SessionState::new("t1", 10);
        state.set_active_workflow("email_builder_agent");
        state.replace_result_set("contacts", vec![]);
        match dispatch(state, "refine the tone") {
            DispatchedTurn::NewTurn(s) => {
                assert_eq!(s.active_workflow.as_deref(), Some("email_builder_agent"));
                assert!(s.shared_result_sets.contains_key("contacts"));
            }
            DispatchedTurn::Resume { .. } => panic!("expected a new turn"),
        }
    }
}
