//! Completion / Summary Node (C11): the priority-ordered
//! decision tree that produces a turn's `final_response`, extracting
//! `created_records` for the client's UI hyperlinking along the way.

use std::sync::Arc;

use conductor_domain::session::{CallStatus, RecordRef, SessionState};
use conductor_domain::tool::{Message, MessageContent};
use conductor_providers::{ChatRequest, LlmProvider};

use crate::interrupt::{build_review_proposal_payload, ReviewProposalPayload};

/// The minimum length an engagement-workflow summary message must have to
/// be trusted as the "summary stage" output rather than an intermediate
/// status line ( point 2 "sufficiently long").
const ENGAGEMENT_SUMMARY_MIN_LEN: usize = 40;

pub enum CompletionOutcome {
    /// `final_response` is ready to send to the client.
    Response(String),
    /// The generic planner fallback surfaced a `propose_action` result;
    /// route back through the review-proposal interrupt instead of
    /// finalizing a response this turn.
    Proposal(ReviewProposalPayload),
}

pub async fn run_completion(session: &mut SessionState, provider: Arc<dyn LlmProvider>) -> CompletionOutcome {
    if let Some(response) = &session.final_response {
        return CompletionOutcome::Response(response.clone());
    }

    if let Some(summary) = engagement_workflow_summary(session) {
        return CompletionOutcome::Response(summary);
    }

    if let Some(campaign_id) = email_workflow_campaign_id(session) {
        let line = generate_campaign_summary_line(session, &campaign_id, provider).await;
        session
            .created_records
            .entry("Campaign".to_string())
            .or_default()
            .push(RecordRef { id: campaign_id, name: "Campaign".to_string() });
        return CompletionOutcome::Response(line);
    }

    if let Some(payload) = find_propose_action_fallback(session) {
        return CompletionOutcome::Proposal(payload);
    }

    let summary = generate_generic_summary(session, provider).await;
    extract_created_records(session);
    CompletionOutcome::Response(summary)
}

/// Detected by presence of the engagement workflow's context keys and a
/// sufficiently long last assistant message.
fn engagement_workflow_summary(session: &SessionState) -> Option<String> {
    session.engagement_workflow_context.as_ref()?;
    let last = session.messages.iter().rev().find_map(|m| match (&m.role, &m.content) {
        (conductor_domain::tool::Role::Assistant, content) => content.text().map(str::to_string),
        _ => None,
    })?;
    if last.len() >= ENGAGEMENT_SUMMARY_MIN_LEN {
        Some(last)
    } else {
        None
    }
}

fn email_workflow_campaign_id(session: &SessionState) -> Option<String> {
    session
        .email_workflow_context
        .as_ref()?
        .get("campaign_id")?
        .as_str()
        .map(str::to_string)
}

async fn generate_campaign_summary_line(
    session: &SessionState,
    campaign_id: &str,
    provider: Arc<dyn LlmProvider>,
) -> String {
    let failed = session.mcp_results.values().any(|r| r.execution_summary.failed_calls > 0);
    let request = ChatRequest {
        messages: vec![
            Message::system("Summarize this email campaign's outcome in one brief sentence."),
            Message::user(format!(
                "Campaign {campaign_id}. {}",
                if failed { "Some sends failed." } else { "All sends succeeded." }
)),
        ],
        tools: vec![],
        temperature: Some(0.3),
        max_tokens: Some(120),
        json_mode: false,
        model: None,
    };

    match provider.chat(request).await {
        Ok(response) => response.content,
        Err(e) => {
            tracing::warn!(error = %e, "campaign summary generation failed");
            if failed {
                format!("Campaign {campaign_id} sent with some failures.")
            } else {
                format!("Campaign {campaign_id} sent successfully.")
            }
        }
    }
}

/// The planner-fallback path where a `propose_action` tool result flows
/// through the generic loop instead of the internal-tool safety gate.
fn find_propose_action_fallback(session: &SessionState) -> Option<ReviewProposalPayload> {
    let has_propose_action = session
        .mcp_results
        .values()
        .flat_map(|r| &r.tool_results)
        .any(|t| t.tool_name == "propose_action" && t.status == CallStatus::Success);

    if has_propose_action {
        build_review_proposal_payload(session)
    } else {
        None
    }
}

async fn generate_generic_summary(session: &SessionState, provider: Arc<dyn LlmProvider>) -> String {
    let mut lines = Vec::new();
    for (service, result) in &session.mcp_results {
        for tool_result in &result.tool_results {
            let status = match tool_result.status {
                CallStatus::Success => "ok",
                CallStatus::Error => "error",
            };
            lines.push(format!("[{service}] {} -> {status}", tool_result.tool_name));
        }
    }
    let digest = if lines.is_empty() { "(no tool calls were made)".to_string() } else { lines.join("\n") };

    let error_note = session
        .error
        .as_ref()
        .map(|e| format!("\n\nAn error occurred: {e}"))
        .unwrap_or_default();

    let request = ChatRequest {
        messages: vec![
            Message::system("Summarize what was accomplished this turn, briefly and naturally."),
            Message::user(format!("Goal: {}\n\nTool activity:\n{digest}{error_note}", session.user_goal)),
        ],
        tools: vec![],
        temperature: Some(0.3),
        max_tokens: Some(300),
        json_mode: false,
        model: None,
    };

    match provider.chat(request).await {
        Ok(response) => response.content,
        Err(e) => {
            tracing::warn!(error = %e, "generic summary generation failed, falling back to a digest");
            format!("Done.\n\n{digest}{error_note}")
        }
    }
}

/// Best-effort entity-name guess from a mutating tool's name, e.g.
/// `update_contact` -> `Contact`.
fn object_name_from_tool(tool_name: &str) -> String {
    let noun = tool_name
        .trim_start_matches("create_")
        .trim_start_matches("update_")
        .trim_start_matches("upsert_")
        .trim_start_matches("batch_upsert_")
        .trim_end_matches('s');
    let mut chars = noun.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => noun.to_string(),
    }
}

/// Extract successful create/upsert outputs into `created_records`, keyed
/// by a best-effort object name.
fn extract_created_records(session: &mut SessionState) {
    let mut found: Vec<(String, RecordRef)> = Vec::new();

    for result in session.mcp_results.values() {
        for tool_result in &result.tool_results {
            let lower = tool_result.tool_name.to_ascii_lowercase();
            let is_mutating = ["create", "update", "upsert"].iter().any(|v| lower.contains(v));
            if !is_mutating || tool_result.status != CallStatus::Success {
                continue;
            }
            let Some(response) = &tool_result.response else { continue };
            let Some(rows) = response.as_array() else { continue };
            let object = object_name_from_tool(&tool_result.tool_name);
            for row in rows {
                if let Some(id) = row.get("Id").and_then(|v| v.as_str()) {
                    let name = row
                        .get("Name")
                        .and_then(|v| v.as_str())
                        .unwrap_or(id)
                        .to_string();
                    found.push((object.clone(), RecordRef { id: id.to_string(), name }));
                }
            }
        }
    }

    for (object, record) in found {
        session.created_records.entry(object).or_default().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_domain::capability::LlmCapabilities;
    use conductor_domain::session::{ExecutionSummary, McpResult, ToolResult};
    use conductor_domain::stream::{BoxStream, StreamEvent};
    use async_trait::async_trait;

    struct StubProvider(String);

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn chat(&self, _req: ChatRequest) -> conductor_domain::error::Result<conductor_providers::ChatResponse> {
            Ok(conductor_providers::ChatResponse {
                content: self.0.clone(),
                tool_calls: vec![],
                usage: None,
                model: "fake".into(),
                finish_reason: Some("stop".into()),
            })
        }
        async fn chat_stream(&self, _req: ChatRequest) -> conductor_domain::error::Result<BoxStream<'static, conductor_domain::error::Result<StreamEvent>>> {
            unimplemented!
        }
        async fn embeddings(
            &self,
            _req: conductor_providers::EmbeddingsRequest,
) -> conductor_domain::error::Result<conductor_providers::EmbeddingsResponse> {
            unimplemented!
        }
        fn capabilities(&self) -> &LlmCapabilities {
            unimplemented!
        }
        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn final_response_passes_through_verbatim() {
        let mut session = SessionState::new("t1", 10);
        session.final_response = Some("already decided".into());
        let provider: Arc<dyn LlmProvider> = Arc::new(StubProvider("unused".into()));
        match run_completion(&mut session, provider).await {
            CompletionOutcome::Response(r) => assert_eq!(r, "already decided"),
            _ => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn engagement_summary_used_verbatim_when_long_enough() {
        let mut session = SessionState::new("t1", 10);
        session.engagement_workflow_context = Some(serde_json::json!({"stage": "summary"}));
        session.append_message(Message::assistant(
            "Engagement analysis complete: 42 contacts clicked the link across 3 campaigns.",
));
        let provider: Arc<dyn LlmProvider> = Arc::new(StubProvider("unused".into()));
        match run_completion(&mut session, provider).await {
            CompletionOutcome::Response(r) => assert!(r.contains("42 contacts")),
            _ => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn created_records_extracted_from_successful_mutating_calls() {
        let mut session = SessionState::new("t1", 10);
        session.merge_mcp_result(
            "salesforce",
            McpResult {
                execution_summary: ExecutionSummary::default(),
                tool_results: vec![ToolResult {
                    tool_name: "update_contact".into(),
                    request: serde_json::json!({}),
                    response: Some(serde_json::json!([{"Id": "003A", "Name": "Ada Lovelace"}])),
                    error: None,
                    status: CallStatus::Success,
                    source_item: None,
                    batch_size: None,
                }],
            },
);
        let provider: Arc<dyn LlmProvider> = Arc::new(StubProvider("Summary text.".into()));
        let _ = run_completion(&mut session, provider).await;
        assert_eq!(session.created_records["Contact"][0].id, "003A");
    }
}
