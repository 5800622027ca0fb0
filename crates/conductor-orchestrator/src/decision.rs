//! Orchestrator Decision Node (C3): composes a progress summary
//! from the Session State, asks the planning model for a routing label, and
//! validates it against the registered service/workflow names.

use std::sync::Arc;

use conductor_domain::config::ServiceRegistryConfig;
use conductor_domain::session::{NextAction, SessionState};
use conductor_domain::tool::Message;
use conductor_providers::{ChatRequest, LlmProvider};

/// Workflow names the decision node may route to, beyond registered
/// services ( validation rule).
const WORKFLOW_LABELS: &[&str] = &["EngagementWorkflow", "EmailBuilderAgent"];

/// Tool-result excerpts are truncated to this many characters (
/// progress summary).
const EXCERPT_LIMIT: usize = 1000;

/// Build the progress-summary block handed to the routing prompt.
pub fn build_progress_summary(session: &SessionState) -> String {
    let mut lines = Vec::new();

    if let Some(directive) = &session.task_directive {
        lines.push(format!("Pending work: {directive}"));
    }
    if let Some(updates) = &session.pending_updates {
        lines.push(format!("Pending updates: {updates}"));
    }
    if let Some(content) = &session.generated_email_content {
        lines.push(format!("Drafted email subject: {}", content.subject));
    }

    for (service, result) in &session.mcp_results {
        lines.push(format!("Service '{service}':"));
        for tool_result in result.tool_results.iter().rev().take(10) {
            let excerpt = tool_result
                .response
                .as_ref()
                .map(|r| truncate(&r.to_string(), EXCERPT_LIMIT))
                .unwrap_or_else(|| truncate(&tool_result.request.to_string(), EXCERPT_LIMIT));
            lines.push(format!(
                "  - {} [{:?}]: {excerpt}",
                tool_result.tool_name, tool_result.status
));
        }
    }

    if lines.is_empty() {
        "(no progress yet)".to_string()
    } else {
        lines.join("\n")
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        let head: String = s.chars().take(limit).collect();
        format!("{head}…")
    }
}

/// Ask the planning model for a routing label and validate it.
/// `CasualChat` replies are resolved by a second model call before
/// returning, since the escape "terminates the turn" with a conversational
/// reply rather than a routing decision.
pub async fn decide_next_action(
    session: &SessionState,
    registry: &ServiceRegistryConfig,
    system_prompt_template: &str,
    provider: Arc<dyn LlmProvider>,
) -> (NextAction, Option<String>) {
    let progress_summary = build_progress_summary(session);
    let prompt = format!(
        "{system_prompt_template}\n\nUser goal: {}\n\nProgress so far:\n{progress_summary}",
        session.user_goal
);

    let known: Vec<&str> = registry
        .names()
        .into_iter()
        .chain(WORKFLOW_LABELS.iter().copied())
        .collect();

    let request = ChatRequest {
        messages: vec![Message::system(prompt), Message::user(session.user_goal.clone())],
        tools: vec![],
        temperature: Some(0.0),
        max_tokens: Some(64),
        json_mode: false,
        model: None,
    };

    let label = match provider.chat(request).await {
        Ok(response) => response.content.trim().to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "decision-node chat call failed, defaulting to complete");
            "complete".to_string()
        }
    };

    let next_action = NextAction::from_label(&label, &known);

    if let NextAction::CasualChat(utterance) = &next_action {
        let reply = generate_casual_reply(utterance, provider).await;
        return (next_action, Some(reply));
    }

    (next_action, None)
}

async fn generate_casual_reply(utterance: &str, provider: Arc<dyn LlmProvider>) -> String {
    let request = ChatRequest {
        messages: vec![
            Message::system("Reply conversationally and briefly."),
            Message::user(utterance),
        ],
        tools: vec![],
        temperature: Some(0.7),
        max_tokens: Some(300),
        json_mode: false,
        model: None,
    };

    match provider.chat(request).await {
        Ok(response) => response.content,
        Err(e) => {
            tracing::warn!(error = %e, "casual-chat reply generation failed");
            "Sorry, I wasn't able to generate a reply just now.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_domain::session::{CallStatus, ExecutionSummary, McpResult, ToolResult};

    #[test]
    fn progress_summary_lists_pending_work_first() {
        let mut session = SessionState::new("t1", 10);
        session.task_directive = Some("mark members as sent".into());
        let summary = build_progress_summary(&session);
        assert!(summary.starts_with("Pending work: mark members as sent"));
    }

    #[test]
    fn progress_summary_truncates_long_excerpts() {
        let mut session = SessionState::new("t1", 10);
        let long_response = "x".repeat(5000);
        session.merge_mcp_result(
            "salesforce",
            McpResult {
                execution_summary: ExecutionSummary::default(),
                tool_results: vec![ToolResult {
                    tool_name: "query_contacts".into(),
                    request: serde_json::json!({}),
                    response: Some(serde_json::Value::String(long_response)),
                    error: None,
                    status: CallStatus::Success,
                    source_item: None,
                    batch_size: None,
                }],
            },
);
        let summary = build_progress_summary(&session);
        assert!(summary.contains('…'));
    }

    #[test]
    fn next_action_from_label_defaults_to_complete_for_unknown_labels() {
        let action = NextAction::from_label("not_a_real_service", &["salesforce"]);
        assert!(matches!(action, NextAction::Complete));
    }
}
