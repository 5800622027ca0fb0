//! Interrupt / Resume Protocol (C10): the two control payloads
//! a turn can suspend on, and how an inbound answer resumes each.
//!
//! There is deliberately no oneshot channel here — a suspended run must
//! survive a full client round-trip (a WebSocket disconnect/reconnect, or
//! simply the user taking their time), so the only durable home for "what
//! happens when this resumes" is the checkpointed `SessionState` itself
//! (`pending_proposal_plan`/`pending_proposal_details`), per DESIGN.md.

use std::sync::OnceLock;

use conductor_domain::plan::{Plan, Proposal};
use conductor_domain::session::SessionState;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// What C2 emits to the client when a run suspends at `review_proposal`
/// .
#[derive(Debug, Clone, Serialize)]
pub struct ReviewProposalPayload {
    pub proposal: Proposal,
}

/// What C2 emits to the client when a run suspends at a yes/no gate.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationPayload {
    pub message: String,
    pub options: Vec<String>,
}

pub fn confirmation_payload(message: impl Into<String>) -> ConfirmationPayload {
    ConfirmationPayload { message: message.into(), options: vec!["yes".into(), "no".into()] }
}

/// Build the client-facing payload for the currently pending proposal, if
/// any.
pub fn build_review_proposal_payload(session: &SessionState) -> Option<ReviewProposalPayload> {
    session
        .pending_proposal_details
        .clone()
        .map(|proposal| ReviewProposalPayload { proposal })
}

fn inline_edit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+)\s*=\s*'([^']*)'").unwrap())
}

/// Parse `Details: Field='value', Field2='value2'` into a field → value
/// map. Returns an empty map if the answer carries no `Details:` prefix.
fn parse_inline_edits(answer: &str) -> Vec<(String, String)> {
    let Some(idx) = answer.find("Details:") else {
        return vec![];
    };
    let tail = &answer[idx + "Details:".len()..];
    inline_edit_re()
        .captures_iter(tail)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// Resume a suspended `review_proposal`: apply any inline field edits to
/// the first (mutating) call in the pending plan, install the result as
/// `plan_override`, and clear the pending-proposal slot. Returns `None` if
/// there was no pending proposal to resume.
pub fn resume_review_proposal(session: &mut SessionState, answer: &str) -> Option<Plan> {
    let mut plan = session.pending_proposal_plan.clone()?;
    let edits = parse_inline_edits(answer);

    if !edits.is_empty() {
        if let Some(first_call) = plan.calls.first_mut() {
            if let Some(obj) = first_call.arguments.as_object_mut() {
                for (field, value) in edits {
                    obj.insert(field, Value::String(value));
                }
            }
        }
    }

    session.resolve_proposal_into_override(plan.clone());
    Some(plan)
}

/// The "yes"-family tokens a confirmation resume branches on.
const YES_TOKENS: &[&str] = &["yes", "y", "yeah", "yep", "confirm", "approve", "ok", "okay", "sure", "go ahead"];

pub fn is_affirmative(answer: &str) -> bool {
    let lower = answer.trim().trim_end_matches('.').to_ascii_lowercase();
    YES_TOKENS.iter().any(|t| lower == *t)
}
