//! Engagement Workflow (C8.2): resolve target → track clicks →
//! update engagement → summarize.
//!
//! Tool names (`query_campaign_by_name`, `query_campaign_members`,
//! `get_click_counts_batch`, `batch_upsert_campaign_members`) are this
//! workflow's own naming choice, matching the conventions used in
//! `email_send.rs`.

use std::collections::HashMap;
use std::sync::OnceLock;

use conductor_domain::plan::Record;
use conductor_domain::session::SessionState;
use conductor_domain::tool::Message;
use regex::Regex;
use serde_json::Value;

use crate::planner::batch::assemble_batch_arguments;
use crate::transport::ToolTransport;

use super::{call_and_record, fail, get_ci, get_ci_str};

const CAMPAIGN_RESULT_SET: &str = "campaign";
const RESPONDED_STATUS: &str = "Responded";

/// Salesforce's `701`-prefixed 18-character Campaign id convention
/// (SPEC_FULL.md supplement), used to spot an explicit campaign id inline
/// in the user's utterance.
fn campaign_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b701[A-Za-z0-9]{15}\b").unwrap())
}

fn quoted_campaign_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"campaign\s+"([^"]+)""#).unwrap())
}

pub async fn run_engagement_workflow(session: &mut SessionState, transport: &dyn ToolTransport) {
    // Stage 1: resolve target.
    let Some(campaign_id) = resolve_target(session, transport).await else {
        return;
    };

    let members_outcome = call_and_record(
        session,
        transport,
        "salesforce",
        "query_campaign_members",
        serde_json::json!({ "campaign_id": campaign_id }),
)
    .await;
    if members_outcome.is_error {
        fail(session, format!("Couldn't load campaign members: {}", members_outcome.raw_text));
        return;
    }
    let members: Vec<Record> = members_outcome
        .rows
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .map(|obj| obj.into_iter().collect())
        .collect();
    if members.is_empty() {
        fail(session, "No campaign members were found for this campaign.");
        return;
    }

    // Stage 2: track clicks.
    let link_to_member: HashMap<String, MemberView> = members
        .iter()
        .filter_map(|m| {
            let link_id = get_ci_str(m, "LinkId__c")?;
            Some((
                link_id,
                MemberView {
                    member_id: get_ci_str(m, "Id").unwrap_or_default(),
                    email: get_ci_str(m, "Contact.Email").or_else(|| get_ci_str(m, "Email")).unwrap_or_default(),
                    name: get_ci_str(m, "Contact.Name").or_else(|| get_ci_str(m, "Name")).unwrap_or_default(),
                    status: get_ci_str(m, "Status").unwrap_or_default(),
                },
))
        })
        .collect();

    if link_to_member.is_empty() {
        fail(session, "No tracked links were found for this campaign's members.");
        return;
    }

    let link_ids: Vec<&String> = link_to_member.keys().collect();
    let clicks_outcome = call_and_record(
        session,
        transport,
        "linkly",
        "get_click_counts_batch",
        serde_json::json!({ "link_ids": link_ids }),
)
    .await;
    if clicks_outcome.is_error {
        fail(session, format!("Couldn't fetch click counts: {}", clicks_outcome.raw_text));
        return;
    }

    let mut members_who_clicked: Vec<&MemberView> = Vec::new();
    for row in clicks_outcome.rows.unwrap_or_default() {
        let Some(link_id) = row.get("link_id").and_then(Value::as_str) else { continue };
        let clicks = row.get("click_count").and_then(Value::as_u64).unwrap_or(0);
        if clicks == 0 {
            continue;
        }
        if let Some(member) = link_to_member.get(link_id) {
            members_who_clicked.push(member);
        }
    }

    if members_who_clicked.is_empty() {
        session.append_message(Message::assistant(format!(
            "No one has clicked their link yet for campaign {campaign_id}."
)));
        session.engagement_workflow_context = Some(serde_json::json!({ "campaign_id": campaign_id, "stage": "summary" }));
        return;
    }

    // Stage 3: update engagement.
    let newly_updated: Vec<&&MemberView> =
        members_who_clicked.iter().filter(|m| m.status != RESPONDED_STATUS).collect();
    let already_responded_count = members_who_clicked.len() - newly_updated.len();

    if !newly_updated.is_empty() {
        let updates: Vec<Value> = newly_updated
            .iter()
            .map(|m| serde_json::json!({ "Id": m.member_id, "fields": { "Status": RESPONDED_STATUS } }))
            .collect();
        let defs = transport.tool_defs("salesforce");
        let Some(tool_def) = defs.iter().find(|d| d.name == "batch_upsert_campaign_members") else {
            fail(session, "The CRM service does not expose a batch-upsert tool for campaign members.");
            return;
        };
        let arguments = assemble_batch_arguments(tool_def, &Value::Null, &updates);
        let outcome = call_and_record(session, transport, "salesforce", "batch_upsert_campaign_members", arguments).await;
        if outcome.is_error {
            fail(session, format!("Updating engagement status failed: {}", outcome.raw_text));
            return;
        }
    }

    // Stage 4: summarize.
    let summary = summarize(newly_updated.len(), already_responded_count, members_who_clicked.len());
    session.append_message(Message::assistant(summary));
    session.engagement_workflow_context = Some(serde_json::json!({ "campaign_id": campaign_id, "stage": "summary" }));
}

struct MemberView {
    member_id: String,
    #[allow(dead_code)]
    email: String,
    #[allow(dead_code)]
    name: String,
    status: String,
}

fn summarize(newly_updated: usize, already_responded: usize, total_clicked: usize) -> String {
    if already_responded == 0 {
        format!("{total_clicked} contact(s) clicked their link and were marked as Responded.")
    } else if newly_updated == 0 {
        format!("{total_clicked} contact(s) clicked their link; all were already marked Responded.")
    } else {
        format!(
            "{total_clicked} contact(s) clicked their link: {newly_updated} newly marked Responded, {already_responded} were already Responded."
)
    }
}

async fn resolve_target(session: &mut SessionState, transport: &dyn ToolTransport) -> Option<String> {
    if let Some(m) = campaign_id_re().find(&session.user_goal) {
        return Some(m.as_str().to_string());
    }

    if session.user_goal.to_ascii_lowercase().contains("this campaign") {
        if let Some(campaign) = session.shared_result_sets.get(CAMPAIGN_RESULT_SET).and_then(|rows| rows.first()) {
            if let Some(id) = get_ci_str(campaign, "Id") {
                return Some(id);
            }
        }
        fail(session, "I couldn't tell which campaign you mean — please name it or select one first.");
        return None;
    }

    if let Some(caps) = quoted_campaign_name_re().captures(&session.user_goal) {
        let name = caps[1].to_string();
        let outcome = call_and_record(
            session,
            transport,
            "salesforce",
            "query_campaign_by_name",
            serde_json::json!({ "name": name }),
)
        .await;
        if outcome.is_error {
            fail(session, format!("Couldn't look up campaign \"{name}\": {}", outcome.raw_text));
            return None;
        }
        let id = outcome
            .rows
            .as_ref()
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("Id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if id.is_none() {
            fail(session, format!("I couldn't find a campaign named \"{name}\"."));
        }
        return id;
    }

    fail(session, "I couldn't tell which campaign you mean — please name it or select one first.");
    None
}
