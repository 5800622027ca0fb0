//! Drives one inbound client message through a full turn: dispatch against
//! the checkpoint, build a [`TurnRunner`], run it to a terminal or suspended
//! outcome, commit the result, and shape the single outbound payload the
//! client sees.
//!
//! A `run_turn` entry point over a checkpoint-store-backed session model,
//! in place of an on-disk transcript writer.

use chrono::Utc;
use conductor_domain::error::Error;
use conductor_orchestrator::{TurnOutcome, TurnRunner};
use conductor_sessions::{
    confirmation_payload, review_proposal_payload, standard_response, ConfirmationPayload,
    DispatchedTurn, ErrorPayload, OutboundPayload, PendingInterrupt,
};

use crate::state::AppState;

/// The routing name this gateway treats as the CRM service for schema
/// context. No concrete `SchemaIndex` ships in this retrieval
/// pack, so `schema_builder` stays `None` regardless — this only decides
/// which service id *would* get one if a vector index were wired in.
pub const SCHEMA_SERVICE_ID: &str = "salesforce";

/// Run one inbound message for `thread_id` to completion (or suspension),
/// returning the payload to send back over the channel.
pub async fn run_inbound_message(state: &AppState, thread_id: &str, message: &str) -> OutboundPayload {
    let now = Utc::now();
    let dispatched = state.checkpoints.dispatch(thread_id, message, now);

    let planner = match state.llm.for_role("planner") {
        Some(p) => p,
        None => {
            return OutboundPayload::Error(ErrorPayload {
                message: "no LLM provider is configured for the 'planner' role".into(),
            })
        }
    };
    let summarizer = state.llm.for_role("summarizer").unwrap_or_else(|| planner.clone());

    let runner = TurnRunner {
        registry: &state.config.services,
        decision_prompt: crate::decision_prompt::DEFAULT_DECISION_PROMPT,
        planner_provider: planner,
        summarizer_provider: summarizer,
        transport: state.mcp.as_ref(),
        schema_builder: None,
        schema_service_id: SCHEMA_SERVICE_ID,
    };

    let (mut session, outcome) = match dispatched {
        DispatchedTurn::NewTurn(mut session) => {
            let outcome = runner.run_new_turn(&mut session).await;
            (session, outcome)
        }
        DispatchedTurn::Resume { mut session, kind, answer } => {
            let outcome = match kind {
                PendingInterrupt::ReviewProposal => runner.resume_review_proposal(&mut session, &answer).await,
                PendingInterrupt::Confirmation => runner.resume_confirmation(&mut session, &answer).await,
            };
            (session, outcome)
        }
    };

    let payload = match &outcome {
        TurnOutcome::Response(_) => OutboundPayload::Response(standard_response(&session)),
        TurnOutcome::ReviewProposal(_) => review_proposal_payload(&session)
            .map(OutboundPayload::ReviewProposal)
            .unwrap_or_else(|| {
                OutboundPayload::Error(ErrorPayload {
                    message: "lost the pending proposal while suspending".into(),
                })
            }),
        TurnOutcome::Confirmation { message, options } => {
            OutboundPayload::Confirmation(ConfirmationPayload {
                message: message.clone(),
                options: options.clone(),
            })
        }
    };

    let settled = !matches!(outcome, TurnOutcome::ReviewProposal(_) | TurnOutcome::Confirmation { .. });
    state.checkpoints.commit(session, settled, Utc::now());
    payload
}

/// Map a transport/subprocess failure into the client's error envelope,
/// for callers that need to short-circuit before a turn even starts (e.g.
/// the WebSocket handshake failing to parse the inbound frame, or a
/// cancelled turn).
pub fn protocol_error(err: impl Into<Error>) -> OutboundPayload {
    OutboundPayload::Error(ErrorPayload { message: err.into().to_string() })
}
