//! Email-Builder Agent (C8.4): a single node that drafts or
//! refines email content, sticky across turns via `active_workflow`, with
//! exit keywords and a save-intent handoff to the save-template workflow.
//!
//! The JSON-mode chat call here follows the same `ChatRequest`/`LlmProvider`
//! shape `completion.rs` and `decision.rs` already use for model calls.

use std::sync::{Arc, OnceLock};

use conductor_domain::session::{EmailContent, SessionState};
use conductor_domain::tool::Message;
use conductor_providers::{ChatRequest, LlmProvider};
use regex::Regex;

const SYSTEM_PROMPT: &str = "You draft and refine marketing emails. Respond with a single JSON object: \
{\"subject\": string, \"body_html\": string, \"body_text\": string, \"tone\": string, \"suggested_audience\": string}. \
No other text.";

fn exit_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(stop|exit|cancel)\b").unwrap())
}

fn save_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bsave\b").unwrap())
}

/// Run one turn of the builder. Returns `true` when a save intent was
/// detected, for [`crate::graph::route_from_email_builder_agent`] to act on.
pub async fn run_email_builder_agent(
    session: &mut SessionState,
    provider: Arc<dyn LlmProvider>,
    other_service_names: &[&str],
) -> bool {
    let lower_goal = session.user_goal.to_ascii_lowercase();

    if is_exit_intent(&lower_goal, other_service_names) {
        session.clear_active_workflow();
        session.final_response = Some("Okay, exiting the email builder.".to_string());
        return false;
    }

    if save_word_re().is_match(&lower_goal) {
        session.append_message(Message::assistant("Let's get this saved."));
        return true;
    }

    session.set_active_workflow("email_builder_agent");
    draft_or_refine(session, provider).await;
    false
}

fn is_exit_intent(lower_goal: &str, other_service_names: &[&str]) -> bool {
    if exit_word_re().is_match(lower_goal) {
        return true;
    }
    other_service_names.iter().any(|name| {
        let word_re = Regex::new(&format!(r"\b{}\b", regex::escape(&name.to_ascii_lowercase()))).unwrap();
        word_re.is_match(lower_goal)
    })
}

async fn draft_or_refine(session: &mut SessionState, provider: Arc<dyn LlmProvider>) {
    let existing = session
        .generated_email_content
        .as_ref()
        .map(|c| format!("Current draft:\nSubject: {}\nHTML: {}\nText: {}\nTone: {}\nAudience: {}", c.subject, c.body_html, c.body_text, c.tone, c.suggested_audience))
        .unwrap_or_else(|| "No draft exists yet.".to_string());

    let request = ChatRequest {
        messages: vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(format!("{existing}\n\nRequest: {}", session.user_goal)),
        ],
        tools: vec![],
        temperature: Some(0.7),
        max_tokens: Some(800),
        json_mode: true,
        model: None,
    };

    match provider.chat(request).await {
        Ok(response) => match parse_email_content(&response.content) {
            Some(content) => {
                let subject = content.subject.clone();
                session.generated_email_content = Some(content);
                session.final_response = Some(format!("Here's a draft: \"{subject}\". Let me know if you'd like changes, or say \"save\" to keep it."));
            }
            None => {
                tracing::warn!("email builder response was not valid EmailContent JSON");
                session.final_response =
                    Some("I had trouble drafting that — could you tell me a bit more about what you want the email to say?".to_string());
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "email builder model call failed");
            session.final_response = Some("I couldn't draft the email right now — please try again.".to_string());
        }
    }
}

fn parse_email_content(raw: &str) -> Option<EmailContent> {
    serde_json::from_str(raw).ok()
}
