//! Placeholder Resolver: `{{field}}` / `{{name.field}}`
//! substitution over a planned call's argument tree.
//!
//! Small, pure functions over owned strings, built as an explicit resolver
//! AST over the argument tree rather than template-string interpolation, to
//! keep the SQL-context heuristic auditable.

use std::collections::HashMap;
use std::sync::OnceLock;

use conductor_domain::plan::Record;
use regex::Regex;
use serde_json::Value;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)?)\s*\}\}").unwrap())
}

fn dirty_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\s*-\s*.+$").unwrap())
}

fn sql_keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(SELECT|FROM|WHERE|INSERT|UPDATE)\b").unwrap())
}

/// Resolve every `{{...}}` placeholder in `value`'s string leaves.
///
/// `item` is the current iteration record (`{{field}}` target); `result_sets`
/// backs `{{name.field}}` lookups against the first record of a named set
/// (case-insensitive name, case-sensitive field —).
pub fn resolve(
    value: &Value,
    item: Option<&Record>,
    result_sets: &HashMap<String, Vec<Record>>,
) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_string(s, item, result_sets)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve(v, item, result_sets)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, item, result_sets)))
                .collect(),
),
        other => other.clone(),
    }
}

fn resolve_string(
    s: &str,
    item: Option<&Record>,
    result_sets: &HashMap<String, Vec<Record>>,
) -> String {
    if !s.contains("{{") {
        return s.to_string();
    }
    let sql_context = sql_keyword_re().is_match(s);

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in placeholder_re().captures_iter(s) {
        let m = caps.get(0).unwrap();
        out.push_str(&s[last..m.start]);
        last = m.end;

        let path = &caps[1];
        match path.split_once('.') {
            Some((name, field)) => match lookup_named(name, field, result_sets) {
                Some(v) => out.push_str(&v),
                None => {
                    tracing::warn!(placeholder = %m.as_str(), "no such result-set field, leaving placeholder literal");
                    out.push_str(m.as_str());
                }
            },
            None => match item.and_then(|rec| rec.get(path)) {
                Some(v) => {
                    let rendered = dirty_clean(&value_to_plain_string(v));
                    if sql_context {
                        out.push('\'');
                        out.push_str(&rendered);
                        out.push('\'');
                    } else {
                        out.push_str(&rendered);
                    }
                }
                None => {
                    tracing::warn!(placeholder = %m.as_str(), "no such item field, leaving placeholder literal");
                    out.push_str(m.as_str());
                }
            },
        }
    }
    out.push_str(&s[last..]);
    out
}

/// Case-insensitive result-set name lookup, first record, case-sensitive
/// field. `{{name.field}}` values are never SQL-quoted — the
/// planner is expected to quote them explicitly.
fn lookup_named(name: &str, field: &str, result_sets: &HashMap<String, Vec<Record>>) -> Option<String> {
    let (_, records) = result_sets.iter().find(|(k, _)| k.eq_ignore_ascii_case(name))?;
    let first = records.first()?;
    let v = first.get(field)?;
    Some(dirty_clean(&value_to_plain_string(v)))
}

fn value_to_plain_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// "Dirty value" cleanup: `"<integer> - <tail>"` reduces to
/// `"<integer>"`, normalizing picklist-style values into their id prefix.
/// `pub(crate)` so the email-send workflow can reuse the same rule to
/// normalize a dirty template id instead of duplicating it.
pub(crate) fn dirty_clean(s: &str) -> String {
    match dirty_value_re().captures(s) {
        Some(caps) => caps[1].to_string(),
        None => s.to_string(),
    }
}
