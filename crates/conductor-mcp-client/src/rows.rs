//! Result normalization for the Tool Transport Adapter.
//!
//! A tool result may carry a typed structured-content field or one or more
//! text parts. [`extract_rows`] walks the documented priority chain; error
//! detection honors the explicit `isError` flag and additionally inspects
//! each text part for `status: "error"`.

use serde_json::Value;

use crate::protocol::ToolCallResult;

const ROW_KEYS: &[&str] = &["records", "result", "data", "rows"];

/// Extract a sequence of records from a tool call result, or `None` if no
/// recognizable row shape was found.
pub fn extract_rows(result: &ToolCallResult) -> Option<Vec<Value>> {
    for part in &result.content {
        if part.content_type != "text" || part.text.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(&part.text) {
            if let Some(rows) = extract_from_value(&value) {
                return Some(rows);
            }
        }
    }
    None
}

/// Step 1/2 of the priority chain: a parsed JSON object or list from a text
/// part. Also reused for structured-content objects (step 3).
fn extract_from_value(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) => {
            if let Some(Value::Array(records)) = map.get("records") {
                return Some(records.clone());
            }
            if let Some(Value::Object(result)) = map.get("result") {
                if let Some(Value::Array(records)) = result.get("records") {
                    return Some(records.clone());
                }
            }
            if let Some(Value::Array(result)) = map.get("result") {
                return Some(result.clone());
            }
            if let Some(Value::Array(data)) = map.get("data") {
                return Some(data.clone());
            }
            if let Some(Value::Array(rows)) = map.get("rows") {
                return Some(rows.clone());
            }
            // A single record: has `id` and none of the known list keys.
            if map.contains_key("id") && !ROW_KEYS.iter().any(|k| map.contains_key(*k)) {
                let mut normalized = map.clone();
                if let Some(id) = normalized.remove("id") {
                    normalized.insert("Id".into(), id);
                }
                return Some(vec![Value::Object(normalized)]);
            }
            None
        }
        _ => None,
    }
}

/// `true` if the result's explicit flag is set, or any text part parses as
/// JSON with `status == "error"`.
pub fn is_error(result: &ToolCallResult) -> bool {
    if result.is_error {
        return true;
    }
    result.content.iter().any(|part| {
        part.content_type == "text"
            && serde_json::from_str::<Value>(&part.text)
                .ok()
                .and_then(|v| v.get("status").and_then(|s| s.as_str()).map(|s| s == "error"))
                .unwrap_or(false)
    })
}
