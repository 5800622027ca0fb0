//! The routing system prompt handed to `TurnRunner::decision_prompt`.
//!
//! `original_source/nodes/marketingorchestrator.py` fetches this text from
//! a Salesforce-hosted prompt record at runtime, out of scope for this
//! gateway ( Non-goals has no remote prompt registry). This default
//! is hardcoded instead, written to cover the same routing decision the
//! original's prompt record made — pick the one service, specialized
//! workflow, or `complete` that best advances the user's goal, or fall back
//! to casual chat.
pub const DEFAULT_DECISION_PROMPT: &str = "\
You route a marketing-automation agent's next step. Given the user's goal \
and the progress made so far, decide what happens next:

- If the goal is already satisfied by the work done so far, respond with \
  exactly: complete
- If there is more work to do, respond with exactly one of the configured \
  service ids, or one of the specialized workflow names (EngagementWorkflow, \
  EmailBuilderAgent), whichever best advances the goal.
- If the user is just chatting and there is no concrete marketing task to \
  perform, respond with: casual_chat:<a short reply>

Never repeat an operation that already succeeded. Respond with nothing but \
the routing label.";
