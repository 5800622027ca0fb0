//! Save-Template Workflow (C8.3): create template → ensure
//! picklist value → interrupt confirmation → commit/cancel.
//!
//! This is the one specialized workflow that spans two turns: the first
//! call ([`run_save_template_workflow`]) suspends by writing
//! `save_workflow_context` with `awaiting_confirmation: true`, which
//! `conductor_sessions::pending_interrupt` already knows how to
//! detect; the second call ([`resume_save_template_workflow`]) is invoked by
//! the turn runner once that detection routes an inbound answer here.
//!
//! The CRM's template-reference field name (`Email_Template__c`) matches the
//! one `email_send.rs` reads off a campaign record — both workflows are
//! reading/writing the same schema field.

use conductor_domain::session::SessionState;
use conductor_domain::tool::Message;
use serde_json::Value;

use crate::interrupt::is_affirmative;
use crate::planner::batch::assemble_batch_arguments;
use crate::transport::ToolTransport;

use super::{call_and_record, fail};

const TEMPLATE_FIELD_NAME: &str = "Email_Template__c";

pub async fn run_save_template_workflow(session: &mut SessionState, transport: &dyn ToolTransport, campaign_id: &str) {
    session.set_active_workflow("save_template_workflow");

    let Some(content) = session.generated_email_content.clone() else {
        fail(session, "There's no drafted email to save yet — ask me to draft one first.");
        return;
    };

    // Step 1: create the template.
    let create_outcome = call_and_record(
        session,
        transport,
        "brevo",
        "create_email_template",
        serde_json::json!({
            "name": content.subject,
            "subject": content.subject,
            "html_content": content.body_html,
            "text_content": content.body_text,
        }),
)
    .await;
    if create_outcome.is_error {
        fail(session, format!("Couldn't create the email template: {}", create_outcome.raw_text));
        return;
    }
    let Some(template_id) = create_outcome
        .rows
        .as_ref()
        .and_then(|rows| rows.first())
        .and_then(|row| row.get("id").or_else(|| row.get("template_id")))
        .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_u64().map(|n| n.to_string())))
    else {
        fail(session, "The email service did not return a template id.");
        return;
    };
    let picklist_value = format!("{template_id}-{}", content.subject);

    // Step 2: ensure the picklist value exists on the CRM's template field.
    let describe_outcome = call_and_record(
        session,
        transport,
        "salesforce",
        "describe_picklist_field",
        serde_json::json!({ "field": TEMPLATE_FIELD_NAME }),
)
    .await;
    if describe_outcome.is_error {
        fail(session, format!("Couldn't read the CRM's template field metadata: {}", describe_outcome.raw_text));
        return;
    }
    let field_meta = describe_outcome.rows.as_ref().and_then(|rows| rows.first());

    let is_global = field_meta.and_then(|m| m.get("value_set_is_global")).and_then(Value::as_bool).unwrap_or(false);
    if is_global {
        fail(
            session,
            "This field uses a global value set shared across objects, so I can't add a new template value to it automatically. Please add it manually in Salesforce setup.",
);
        return;
    }

    let already_present = field_meta
        .and_then(|m| m.get("values"))
        .and_then(Value::as_array)
        .is_some_and(|values| values.iter().any(|v| v.as_str() == Some(picklist_value.as_str())));

    if !already_present {
        let existing_values: Vec<Value> = field_meta
            .and_then(|m| m.get("values"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut updated_values = existing_values;
        updated_values.push(Value::String(picklist_value.clone()));

        let update_outcome = call_and_record(
            session,
            transport,
            "salesforce",
            "update_picklist_field",
            serde_json::json!({ "field": TEMPLATE_FIELD_NAME, "values": updated_values }),
)
        .await;
        if update_outcome.is_error {
            fail(session, format!("Couldn't add the new template value to the CRM field: {}", update_outcome.raw_text));
            return;
        }
    }

    // Step 3: interrupt for confirmation.
    let message = format!("Save \"{}\" as the template for this campaign?", content.subject);
    session.save_workflow_context = Some(serde_json::json!({
        "awaiting_confirmation": true,
        "message": message,
        "options": ["Yes", "No"],
        "campaign_id": campaign_id,
        "picklist_value": picklist_value,
    }));
}

/// Resume the suspended confirmation gate.
pub async fn resume_save_template_workflow(session: &mut SessionState, transport: &dyn ToolTransport, answer: &str) {
    let Some(ctx) = session.save_workflow_context.take() else {
        fail(session, "There was nothing pending to confirm.");
        return;
    };
    session.clear_active_workflow();

    let campaign_id = ctx.get("campaign_id").and_then(Value::as_str).unwrap_or_default().to_string();
    let picklist_value = ctx.get("picklist_value").and_then(Value::as_str).unwrap_or_default().to_string();

    if !is_affirmative(answer) {
        session.final_response = Some("Okay, I won't save this template.".to_string());
        return;
    }

    let update = serde_json::json!({ "Id": campaign_id, "fields": { TEMPLATE_FIELD_NAME: picklist_value } });
    let defs = transport.tool_defs("salesforce");
    let Some(tool_def) = defs.iter().find(|d| d.name == "batch_upsert_campaigns") else {
        fail(session, "The CRM service does not expose a batch-upsert tool for campaigns.");
        return;
    };
    let arguments = assemble_batch_arguments(tool_def, &Value::Null, &[update]);
    let outcome = call_and_record(session, transport, "salesforce", "batch_upsert_campaigns", arguments).await;
    if outcome.is_error {
        fail(session, format!("Saving the template to the campaign failed: {}", outcome.raw_text));
        return;
    }

    let message = "Template saved to the campaign.".to_string();
    session.append_message(Message::assistant(message.clone()));
    session.final_response = Some(message);
}
