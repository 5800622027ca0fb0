//! Session Manager : owns one checkpointed [`SessionState`] per
//! client connection, keyed by thread-id. Dispatches each inbound message to
//! either a fresh turn or a suspended interrupt's resume path, and shapes the
//! single outbound payload the client sees once the turn settles.
//!
//! Deliberately in-memory only ( Non-goals: "does not persist session
//! state to disk"); a disk- or Redis-backed checkpoint store could implement
//! the same [`store::CheckpointStore`] shape without changing callers.

mod dispatch;
mod outbound;
mod store;

pub use dispatch::{dispatch, pending_interrupt, DispatchedTurn, PendingInterrupt};
pub use outbound::{
    confirmation_payload, review_proposal_payload, standard_response, ConfirmationPayload,
    ErrorPayload, OutboundPayload, ProposalView, ReviewProposalPayload, StandardResponse,
};
pub use store::CheckpointStore;
