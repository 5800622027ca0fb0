//! Outbound payload shaping for the client channel.
//!
//! Exactly one of these is emitted per turn. The control shapes
//! (`review_proposal`, `confirmation`) are forwarded verbatim from whatever
//! the graph left on the checkpoint when it suspended; the standard response
//! is assembled from the settled `SessionState`.

use conductor_domain::plan::{ActionType, ProposalField, Record};
use conductor_domain::session::{EmailContent, RecordRef, SessionState};
use serde::Serialize;
use std::collections::HashMap;

/// The three server→client shapes, plus the error envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutboundPayload {
    #[serde(rename = "response")]
    Response(StandardResponse),
    #[serde(rename = "review_proposal")]
    ReviewProposal(ReviewProposalPayload),
    #[serde(rename = "confirmation")]
    Confirmation(ConfirmationPayload),
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Serialize)]
pub struct StandardResponse {
    pub success: bool,
    pub response: String,
    pub iterations: u32,
    pub salesforce_data: bool,
    pub created_records: HashMap<String, Vec<RecordRef>>,
    pub generated_email_content: Option<EmailContent>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewProposalPayload {
    pub proposal: ProposalView,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalView {
    pub object: String,
    pub action_type: ActionType,
    pub fields: Vec<ProposalField>,
    pub contact_count: Option<usize>,
    pub related_records: Vec<Record>,
    pub available_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationPayload {
    pub message: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Build the standard response — the fallback-branch shape sent when no
/// control gate is pending.
///
/// `created_records` is filtered to drop placeholder-name entries
/// ([`SessionState::created_records_for_client`]); transient per-turn
/// artifacts like `generated_email_content` are passed through as-is.
pub fn standard_response(state: &SessionState) -> StandardResponse {
    StandardResponse {
        success: state.error.is_none(),
        response: state.final_response.clone().unwrap_or_default(),
        iterations: state.iteration_count,
        salesforce_data: state.salesforce_data,
        created_records: state.created_records_for_client(),
        generated_email_content: state.generated_email_content.clone(),
        error: state.error.clone(),
    }
}

/// Build the `review_proposal` control payload from the checkpoint's pending
/// proposal. Returns `None` if no proposal is actually pending —
/// callers should only reach this after [`crate::pending_interrupt`] reported
/// [`crate::PendingInterrupt::ReviewProposal`].
pub fn review_proposal_payload(state: &SessionState) -> Option<ReviewProposalPayload> {
    let proposal = state.pending_proposal_details.as_ref()?;
    let message = format!(
        "Review the proposed {} of {}.",
        match proposal.action_type {
            ActionType::Create => "creation",
            ActionType::Update => "update",
            ActionType::Delete => "deletion",
            ActionType::Upsert => "upsert",
        },
        proposal.object
);
    Some(ReviewProposalPayload {
        proposal: ProposalView {
            object: proposal.object.clone(),
            action_type: proposal.action_type,
            fields: proposal.fields.clone(),
            contact_count: proposal.contact_count,
            related_records: proposal.related_records.clone(),
            available_fields: proposal.available_fields.clone(),
        },
        message,
    })
}

/// Build the `confirmation` control payload from the save-template
/// workflow's scratch context.
pub fn confirmation_payload(state: &SessionState) -> Option<ConfirmationPayload> {
    let ctx = state.save_workflow_context.as_ref()?;
    let message = ctx.get("message")?.as_str()?.to_string();
    let options = ctx
        .get("options")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_else(|| vec!["Yes".to_string(), "No".to_string()]);
    Some(ConfirmationPayload { message, options })
}
