//! Batch-vs-iterate classification and argument assembly.
//!
//! Classification itself (`ToolDefinition::is_batch_capable`/
//! `batch_parameter_name`) already lives on the domain type since it's a
//! pure property of the tool descriptor; this module only assembles the
//! batch call's arguments once the caller has decided to go the batch route.

use conductor_domain::tool::ToolDefinition;
use serde_json::{Map, Value};

/// Pack `resolved_items` under the tool's batch parameter, merged with
/// `base_args` (the planned call's non-batch arguments, already resolved
/// with no current item).
///
/// Two tool families get bespoke assembly; everything else packs each
/// resolved item verbatim under the batch parameter. The special-cased
/// shapes are a best-effort design (see DESIGN.md) — no source-of-truth
/// wire schema for either family ships with this crate.
pub fn assemble_batch_arguments(
    tool: &ToolDefinition,
    base_args: &Value,
    resolved_items: &[Value],
) -> Value {
    let batch_param = tool.batch_parameter_name().unwrap_or("items");
    let mut out: Map<String, Value> = base_args.as_object().cloned().unwrap_or_default();
    out.remove(batch_param);

    if tool.name.contains("send_batch_emails") {
        assemble_batch_email(&mut out, resolved_items);
    } else if tool.name.contains("batch_upsert") {
        let packed: Vec<Value> = resolved_items.iter().map(pack_upsert_pair).collect();
        out.insert(batch_param.to_string(), Value::Array(packed));
    } else {
        out.insert(batch_param.to_string(), Value::Array(resolved_items.to_vec()));
    }

    Value::Object(out)
}

/// Collect each item's `recipients`/`cc`/`bcc` lists, concatenating; coerce
/// `template_id` to an integer.
fn assemble_batch_email(out: &mut Map<String, Value>, resolved_items: &[Value]) {
    let mut recipients = Vec::new();
    let mut cc = Vec::new();
    let mut bcc = Vec::new();
    for item in resolved_items {
        if let Some(arr) = item.get("recipients").and_then(Value::as_array) {
            recipients.extend(arr.iter().cloned());
        }
        if let Some(arr) = item.get("cc").and_then(Value::as_array) {
            cc.extend(arr.iter().cloned());
        }
        if let Some(arr) = item.get("bcc").and_then(Value::as_array) {
            bcc.extend(arr.iter().cloned());
        }
    }
    out.insert("recipients".into(), Value::Array(recipients));
    if !cc.is_empty() {
        out.insert("cc".into(), Value::Array(cc));
    }
    if !bcc.is_empty() {
        out.insert("bcc".into(), Value::Array(bcc));
    }
    if let Some(Value::String(s)) = out.get("template_id").cloned() {
        if let Ok(n) = s.parse::<i64>() {
            out.insert("template_id".into(), Value::Number(n.into()));
        }
    }
}

/// `{record_id, fields}` pairs for the batch-upsert tool family.
fn pack_upsert_pair(item: &Value) -> Value {
    let record_id = item
        .get("Id")
        .or_else(|| item.get("record_id"))
        .cloned()
        .unwrap_or(Value::Null);
    let fields = item.get("fields").cloned().unwrap_or_else(|| item.clone());
    serde_json::json!({ "record_id": record_id, "fields": fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, batch_prop: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: String::new(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { batch_prop: {"type": "array"} }
            }),
        }
    }

    #[test]
    fn default_family_packs_items_verbatim() {
        let tool = tool("upsert_records", "records");
        let items = vec![serde_json::json!({"Id": "1"}), serde_json::json!({"Id": "2"})];
        let out = assemble_batch_arguments(&tool, &serde_json::json!({}), &items);
        assert_eq!(out["records"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn batch_email_family_concatenates_recipients_and_coerces_template_id() {
        let tool = tool("send_batch_emails", "message_versions");
        let items = vec![
            serde_json::json!({"recipients": [{"email": "a@x"}], "cc": [{"email": "c@x"}]}),
            serde_json::json!({"recipients": [{"email": "b@x"}]}),
        ];
        let base = serde_json::json!({"template_id": "42"});
        let out = assemble_batch_arguments(&tool, &base, &items);
        assert_eq!(out["recipients"].as_array().unwrap().len(), 2);
        assert_eq!(out["cc"].as_array().unwrap().len(), 1);
        assert_eq!(out["template_id"], serde_json::json!(42));
    }

    #[test]
    fn batch_upsert_family_packs_record_id_fields_pairs() {
        let tool = tool("batch_upsert_records", "records");
        let items = vec![serde_json::json!({"Id": "701x", "fields": {"Status": "Sent"}})];
        let out = assemble_batch_arguments(&tool, &serde_json::json!({}), &items);
        let packed = &out["records"][0];
        assert_eq!(packed["record_id"], "701x");
        assert_eq!(packed["fields"]["Status"], "Sent");
    }
}
