//! Prompt-section formatting ( step 5). Grounded on
//! `crates/contextpack/src/injection.rs`'s machine-inspectable delimiter
//! style, re-targeted from workspace Markdown files to selected CRM
//! object/field schemas and mandatory defaults.

use crate::builder()::SelectedField;

pub fn format_object_schema(object: &str, fields: &[SelectedField]) -> String {
    let mut out = format!("=== SCHEMA: {object} ===\n");
    for field in fields {
        out.push_str(&format!(
            "- {name} ({ty}): {desc}\n",
            name = field.name,
            ty = field.field_type,
            desc = if field.description.is_empty() { "(no description)" } else { &field.description }
));
    }
    out.push_str("--- END ---\n");
    out
}

pub fn format_mandatory_defaults(object: &str, defaults: &[(String, String)]) -> String {
    if defaults.is_empty() {
        return String::new();
    }
    let mut out = format!("=== MANDATORY_DEFAULTS: {object} ===\n");
    for (name, value) in defaults {
        out.push_str(&format!("- {name} = {value}\n"));
    }
    out.push_str("--- END ---\n");
    out
}
