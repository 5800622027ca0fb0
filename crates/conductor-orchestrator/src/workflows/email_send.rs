//! Email-Send Workflow (C8.1): preview → analyze links → link
//! shorten (conditional) → send → delivery-status check → Salesforce update.
//!
//! Tool names below (`get_email_template_preview`, `shorten_urls_batch`,
//! `send_batch_emails`, `get_email_engagement_batch`,
//! `query_campaign_members`, `batch_upsert_campaign_members`) are this
//! workflow's own naming choice — the pipeline's stages don't imply a
//! wire schema for the services behind them — chosen to read naturally
//! against each service's domain (CRM vs. transactional email vs.
//! shortener), the same way `planner::batch`'s tool-family special cases
//! (`send_batch_emails`, `batch_upsert_*`) are named.

use std::collections::HashMap;
use std::sync::OnceLock;

use conductor_domain::plan::Record;
use conductor_domain::session::SessionState;
use conductor_domain::tool::Message;
use regex::Regex;
use serde_json::{Map, Value};

use crate::placeholder;
use crate::planner::batch::assemble_batch_arguments;
use crate::transport::ToolTransport;

use super::{call_and_record, fail, get_ci, get_ci_str};

const CAMPAIGN_RESULT_SET: &str = "campaign";
const CONTACTS_RESULT_SET: &str = "contacts";

/// Href substrings that disqualify a link from tracking/shortening.
const TRACKING_URL_EXCLUDES: &[&str] = &["unsubscribe", "mailto:", "tel:", ".png", ".jpg", ".jpeg", ".gif"];

/// Synonyms resolved to the same template variable ( step 4
/// "name/first-name synonyms").
const NAME_SYNONYMS: &[&str] = &["FirstName", "Name", "first_name"];

/// The reserved template variable the first short link is injected under.
const LINK_PARAM: &str = "LINK";

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).unwrap())
}

fn template_var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*params\.([A-Za-z0-9_]+)\s*\}\}").unwrap())
}

/// Drive the full six-step pipeline, mutating `session` in place. Every
/// early return has already called [`fail`], leaving `workflow_failed`,
/// `error`, and `final_response` set.
pub async fn run_email_send_workflow(session: &mut SessionState, transport: &dyn ToolTransport) {
    // Step 1: Preview.
    let Some(campaign) = session.shared_result_sets.get(CAMPAIGN_RESULT_SET).and_then(|rows| rows.first()).cloned()
    else {
        fail(session, "I couldn't find a campaign to send — please select one first.");
        return;
    };
    let Some(contacts) = session.shared_result_sets.get(CONTACTS_RESULT_SET).cloned() else {
        fail(session, "I couldn't find any contacts to send to.");
        return;
    };
    if contacts.is_empty() {
        fail(session, "The contact list for this campaign is empty.");
        return;
    }

    let Some(campaign_id) = get_ci_str(&campaign, "Id") else {
        fail(session, "The campaign record is missing its Id.");
        return;
    };
    let Some(raw_template_id) = get_ci_str(&campaign, "Email_Template__c") else {
        fail(session, "This campaign has no email template configured.");
        return;
    };
    let template_id = placeholder::dirty_clean(&raw_template_id);

    session.add_created_record(
        "Campaign",
        conductor_domain::session::RecordRef {
            id: campaign_id.clone(),
            name: get_ci_str(&campaign, "Name").unwrap_or_else(|| campaign_id.clone()),
        },
);

    let preview_outcome = call_and_record(
        session,
        transport,
        "brevo",
        "get_email_template_preview",
        serde_json::json!({ "template_id": template_id }),
)
    .await;
    if preview_outcome.is_error {
        fail(session, format!("Couldn't render the email preview: {}", preview_outcome.raw_text));
        return;
    }
    let html = preview_outcome
        .rows
        .as_ref()
        .and_then(|rows| rows.first())
        .and_then(|row| row.get("html").or_else(|| row.get("preview_html")))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    // Step 2: Analyze links.
    let urls = extract_trackable_urls(&html);
    let template_vars = extract_template_vars(&html);

    // Step 3: Link shorten, conditional on any URLs being present.
    let short_links_map = if urls.is_empty() {
        HashMap::new()
    } else {
        match shorten_links(session, transport, &contacts, &urls).await {
            Some(map) => map,
            None => return, // fail already called inside shorten_links
        }
    };

    // Step 4: Send.
    let send_outcome = match send_batch(session, transport, &template_id, &contacts, &template_vars, &short_links_map).await {
        Some(outcome) => outcome,
        None => return,
    };

    // Step 5: Delivery-status check.
    let (successfully_sent, mut failed_sends) = send_outcome;
    let (successfully_sent, failed_sends) =
        match reclassify_bounces(session, transport, successfully_sent, &mut failed_sends).await {
            Some(result) => result,
            None => return,
        };

    // Step 6: Salesforce update.
    update_campaign_members(session, transport, &campaign_id, &contacts, &short_links_map, &successfully_sent, &failed_sends)
        .await;

    session.email_workflow_context = Some(serde_json::json!({
        "campaign_id": campaign_id,
        "successfully_sent": successfully_sent.len(),
        "failed": failed_sends.len(),
    }));
    session.salesforce_data = true;
}

fn extract_trackable_urls(html: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    href_re()
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .filter(|url| {
            let lower = url.to_ascii_lowercase();
            !TRACKING_URL_EXCLUDES.iter().any(|bad| lower.contains(bad))
        })
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn extract_template_vars(html: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    template_var_re()
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

/// `contactId -> {original_url -> {short_url, link_id}}` ( step 3).
type ShortLinksMap = HashMap<String, HashMap<String, (String, String)>>;

async fn shorten_links(
    session: &mut SessionState,
    transport: &dyn ToolTransport,
    contacts: &[Record],
    urls: &[String],
) -> Option<ShortLinksMap> {
    let pairs: Vec<Value> = contacts
        .iter()
        .filter_map(|c| get_ci_str(c, "Id"))
        .flat_map(|contact_id| {
            urls.iter()
                .map(move |url| serde_json::json!({ "contact_id": contact_id, "url": url }))
        })
        .collect();

    let outcome = call_and_record(
        session,
        transport,
        "linkly",
        "shorten_urls_batch",
        serde_json::json!({ "pairs": pairs }),
)
    .await;
    if outcome.is_error {
        fail(session, format!("Couldn't shorten campaign links: {}", outcome.raw_text));
        return None;
    }

    let mut map: ShortLinksMap = HashMap::new();
    for row in outcome.rows.unwrap_or_default() {
        let (Some(contact_id), Some(url), Some(short_url), Some(link_id)) = (
            row.get("contact_id").and_then(Value::as_str),
            row.get("url").and_then(Value::as_str),
            row.get("short_url").and_then(Value::as_str),
            row.get("link_id").and_then(Value::as_str),
) else {
            continue;
        };
        map.entry(contact_id.to_string())
            .or_default()
            .insert(url.to_string(), (short_url.to_string(), link_id.to_string()));
    }
    Some(map)
}

fn build_contact_params(contact: &Record, template_vars: &[String], short_url: Option<&str>) -> Value {
    let mut params = Map::new();
    for var in template_vars {
        if var.eq_ignore_ascii_case(LINK_PARAM) {
            continue;
        }
        let candidates: Vec<&str> = if NAME_SYNONYMS.iter().any(|s| s.eq_ignore_ascii_case(var)) {
            NAME_SYNONYMS.to_vec()
        } else {
            vec![var.as_str()]
        };
        let value = candidates.iter().find_map(|c| get_ci(contact, c));
        if let Some(value) = value {
            params.insert(var.clone(), value.clone());
        }
    }
    if let Some(url) = short_url {
        params.insert(LINK_PARAM.to_string(), Value::String(url.to_string()));
    }
    Value::Object(params)
}

/// `successfully_sent_emails` (lowercased), `failed_sends` (email -> reason).
type SendOutcome = (Vec<String>, HashMap<String, String>);

async fn send_batch(
    session: &mut SessionState,
    transport: &dyn ToolTransport,
    template_id: &str,
    contacts: &[Record],
    template_vars: &[String],
    short_links_map: &ShortLinksMap,
) -> Option<SendOutcome> {
    let defs = transport.tool_defs("brevo");
    let Some(tool_def) = defs.iter().find(|d| d.name == "send_batch_emails") else {
        fail(session, "The email service does not expose a batch-send tool.");
        return None;
    };

    let mut recipient_emails = Vec::new();
    let items: Vec<Value> = contacts
        .iter()
        .filter_map(|contact| {
            let email = get_ci_str(contact, "Email")?;
            let contact_id = get_ci_str(contact, "Id").unwrap_or_default();
            let first_short_url = short_links_map
                .get(&contact_id)
                .and_then(|urls| urls.values().next())
                .map(|(short_url, _)| short_url.as_str());
            recipient_emails.push(email.clone());
            Some(serde_json::json!({
                "recipients": [{ "email": email }],
                "params": build_contact_params(contact, template_vars, first_short_url),
            }))
        })
        .collect();

    let base_args = serde_json::json!({ "template_id": template_id });
    let arguments = assemble_batch_arguments(tool_def, &base_args, &items);

    let outcome = call_and_record(session, transport, "brevo", "send_batch_emails", arguments).await;
    if outcome.is_error {
        fail(session, format!("Sending the campaign email failed: {}", outcome.raw_text));
        return None;
    }

    Some(parse_batch_send_response(outcome.rows.as_deref().unwrap_or(&[]), &recipient_emails))
}

/// Parse the batch-send response into sent/failed sets.
///
/// When the response carries neither an explicit success list nor a
/// failure map, this falls back to "assume every recipient sent" — a
/// known risk for at-least-once correctness (it will over-report success if
/// the transactional service ever returns a bare acknowledgment with no
/// per-recipient detail).
fn parse_batch_send_response(rows: &[Value], recipient_emails: &[String]) -> SendOutcome {
    let obj = rows.first().and_then(Value::as_object);
    if let Some(obj) = obj {
        let sent = obj
            .get("successfully_sent_emails")
            .or_else(|| obj.get("successfully_sent"))
            .or_else(|| obj.get("sent"))
            .and_then(Value::as_array);
        let failed = obj
            .get("failed_sends")
            .or_else(|| obj.get("failed"))
            .and_then(Value::as_object);

        if sent.is_some() || failed.is_some() {
            let sent_emails: Vec<String> = sent
                .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_ascii_lowercase).collect())
                .unwrap_or_default();
            let failed_map: HashMap<String, String> = failed
                .map(|m| {
                    m.iter()
                        .filter_map(|(k, v)| v.as_str().map(|reason| (k.to_ascii_lowercase(), reason.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            return (sent_emails, failed_map);
        }
    }

    (recipient_emails.iter().map(|e| e.to_ascii_lowercase()).collect(), HashMap::new())
}

async fn reclassify_bounces(
    session: &mut SessionState,
    transport: &dyn ToolTransport,
    successfully_sent: Vec<String>,
    failed_sends: &mut HashMap<String, String>,
) -> Option<(Vec<String>, HashMap<String, String>)> {
    if successfully_sent.is_empty() {
        return Some((successfully_sent, failed_sends.clone()));
    }

    let outcome = call_and_record(
        session,
        transport,
        "brevo",
        "get_email_engagement_batch",
        serde_json::json!({ "emails": successfully_sent }),
)
    .await;
    if outcome.is_error {
        fail(session, format!("Couldn't check delivery status: {}", outcome.raw_text));
        return None;
    }

    let mut bounced = std::collections::HashSet::new();
    for row in outcome.rows.unwrap_or_default() {
        let is_bounced = row.get("bounced").and_then(Value::as_bool).unwrap_or(false);
        if !is_bounced {
            continue;
        }
        if let Some(email) = row.get("email").and_then(Value::as_str) {
            bounced.insert(email.to_ascii_lowercase());
        }
    }

    let mut still_sent = Vec::new();
    for email in successfully_sent {
        if bounced.contains(&email) {
            failed_sends.insert(email, "bounced".to_string());
        } else {
            still_sent.push(email);
        }
    }
    Some((still_sent, failed_sends.clone()))
}

async fn update_campaign_members(
    session: &mut SessionState,
    transport: &dyn ToolTransport,
    campaign_id: &str,
    contacts: &[Record],
    short_links_map: &ShortLinksMap,
    successfully_sent: &[String],
    failed_sends: &HashMap<String, String>,
) {
    let sent_set: std::collections::HashSet<&str> = successfully_sent.iter().map(String::as_str).collect();

    let member_rows = if contacts.iter().all(|c| get_ci(c, "CampaignMemberId").is_some()) {
        contacts.to_vec()
    } else {
        let outcome = call_and_record(
            session,
            transport,
            "salesforce",
            "query_campaign_members",
            serde_json::json!({ "campaign_id": campaign_id }),
)
        .await;
        outcome.rows.unwrap_or_default().into_iter().map(value_to_record).collect()
    };

    let mut updates = Vec::new();
    for member in &member_rows {
        let Some(email) = get_ci_str(member, "Email").or_else(|| get_ci_str(member, "Contact.Email")) else {
            continue;
        };
        let lower = email.to_ascii_lowercase();
        if failed_sends.contains_key(&lower) || !sent_set.contains(lower.as_str()) {
            continue;
        }
        let Some(member_id) = get_ci_str(member, "CampaignMemberId").or_else(|| get_ci_str(member, "Id")) else {
            continue;
        };
        let contact_id = get_ci_str(member, "ContactId").or_else(|| get_ci_str(member, "Id")).unwrap_or_default();
        let (link, link_id) = short_links_map
            .get(&contact_id)
            .and_then(|urls| urls.values().next())
            .cloned()
            .unwrap_or_default();

        updates.push(serde_json::json!({
            "Id": member_id,
            "fields": {
                "Status": "Sent",
                "Link__c": link,
                "LinkId__c": link_id,
            }
        }));
    }

    if updates.is_empty() {
        return;
    }

    let defs = transport.tool_defs("salesforce");
    let Some(tool_def) = defs.iter().find(|d| d.name == "batch_upsert_campaign_members") else {
        fail(session, "The CRM service does not expose a batch-upsert tool for campaign members.");
        return;
    };
    let arguments = assemble_batch_arguments(tool_def, &Value::Null, &updates);
    let outcome = call_and_record(session, transport, "salesforce", "batch_upsert_campaign_members", arguments).await;
    if outcome.is_error {
        fail(session, format!("Updating campaign members in the CRM failed: {}", outcome.raw_text));
        return;
    }

    session.append_message(Message::assistant(format!(
        "Campaign sent: {} delivered, {} failed.",
        successfully_sent.len(),
        failed_sends.len()
)));
}

fn value_to_record(v: Value) -> Record {
    v.as_object().cloned().unwrap_or_default().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::{outcome_error, outcome_rows, FakeTransport};
    use conductor_domain::tool::ToolDefinition;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn transport_with_batch_tools() -> FakeTransport {
        FakeTransport::new()
            .with_def("brevo", ToolDefinition {
                name: "send_batch_emails".into(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object", "properties": {"message_versions": {"type": "array"}}}),
            })
            .with_def("salesforce", ToolDefinition {
                name: "batch_upsert_campaign_members".into(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object", "properties": {"records": {"type": "array"}}}),
            })
    }

    #[test]
    fn extracts_hrefs_and_filters_tracking_urls() {
        let html = r#"<a href="https://example.com/a">go</a><a href="mailto:x@y.com">mail</a><a href="https://example.com/unsubscribe">bye</a>"#;
        let urls = extract_trackable_urls(html);
        assert_eq!(urls, vec!["https://example.com/a".to_string()]);
    }

    #[test]
    fn extracts_template_vars() {
        let html = "Hi {{ params.FirstName }}, click {{params.LINK}}";
        let vars = extract_template_vars(html);
        assert_eq!(vars, vec!["FirstName".to_string(), "LINK".to_string()]);
    }

    #[test]
    fn build_params_resolves_name_synonym_and_injects_link() {
        let contact = record(&[("FirstName", Value::String("Ada".into()))]);
        let params = build_contact_params(&contact, &["Name".to_string(), "LINK".to_string()], Some("https://s/x"));
        assert_eq!(params["Name"], "Ada");
        assert_eq!(params["LINK"], "https://s/x");
    }

    #[test]
    fn parse_batch_send_response_falls_back_to_assume_all_sent() {
        let (sent, failed) = parse_batch_send_response(&[], &["A@X.COM".to_string()]);
        assert_eq!(sent, vec!["a@x.com".to_string()]);
        assert!(failed.is_empty());
    }

    #[test]
    fn parse_batch_send_response_reads_explicit_lists() {
        let rows = vec![serde_json::json!({
            "successfully_sent_emails": ["a@x.com"],
            "failed_sends": {"b@x.com": "invalid address"}
        })];
        let (sent, failed) = parse_batch_send_response(&rows, &["a@x.com".to_string(), "b@x.com".to_string()]);
        assert_eq!(sent, vec!["a@x.com".to_string()]);
        assert_eq!(failed["b@x.com"], "invalid address");
    }

    #[tokio::test]
    async fn missing_campaign_fails_the_workflow_without_calling_the_transport() {
        let transport = FakeTransport::new();
        let mut session = SessionState::new("t1", 10);
        session.replace_result_set(CONTACTS_RESULT_SET, vec![record(&[("Email", Value::String("a@x.com".into()))])]);
        run_email_send_workflow(&mut session, &transport).await;
        assert!(session.workflow_failed);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn full_pipeline_runs_end_to_end_with_no_links() {
        let transport = transport_with_batch_tools();
        transport.push_response(
            "get_email_template_preview",
            outcome_rows(vec![serde_json::json!({"html": "Hi {{ params.FirstName }}"})]),
);
        transport.push_response(
            "send_batch_emails",
            outcome_rows(vec![serde_json::json!({
                "successfully_sent_emails": ["a@x.com"],
                "failed_sends": {}
            })]),
);
        transport.push_response("get_email_engagement_batch", outcome_rows(vec![serde_json::json!({"email": "a@x.com", "bounced": false})]));
        transport.push_response(
            "query_campaign_members",
            outcome_rows(vec![serde_json::json!({
                "Id": "00v1", "ContactId": "003A", "Email": "a@x.com", "Status": "Sent"
            })]),
);
        transport.push_response("batch_upsert_campaign_members", outcome_rows(vec![]));

        let mut session = SessionState::new("t1", 10);
        session.replace_result_set(
            CAMPAIGN_RESULT_SET,
            vec![record(&[
                ("Id", Value::String("701x".into())),
                ("Name", Value::String("Winter".into())),
                ("Email_Template__c", Value::String("3 - Welcome".into())),
            ])],
);
        session.replace_result_set(
            CONTACTS_RESULT_SET,
            vec![record(&[
                ("Id", Value::String("003A".into())),
                ("Email", Value::String("a@x.com".into())),
                ("FirstName", Value::String("Ada".into())),
            ])],
);

        run_email_send_workflow(&mut session, &transport).await;

        assert!(!session.workflow_failed, "error was {:?}", session.error);
        assert!(session.salesforce_data);
        let sent_args = transport.calls_for("send_batch_emails");
        assert_eq!(sent_args[0]["template_id"], 3);
    }

    #[tokio::test]
    async fn preview_failure_short_circuits_before_sending() {
        let transport = transport_with_batch_tools();
        transport.push_response("get_email_template_preview", outcome_error("template not found"));

        let mut session = SessionState::new("t1", 10);
        session.replace_result_set(
            CAMPAIGN_RESULT_SET,
            vec![record(&[("Id", Value::String("701x".into())), ("Email_Template__c", Value::String("3".into()))])],
);
        session.replace_result_set(CONTACTS_RESULT_SET, vec![record(&[("Email", Value::String("a@x.com".into()))])]);

        run_email_send_workflow(&mut session, &transport).await;

        assert!(session.workflow_failed);
        assert_eq!(transport.call_count(), 1, "must not call send after a failed preview");
    }
}
