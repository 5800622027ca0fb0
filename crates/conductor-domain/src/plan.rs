//! The ephemeral per-planning-pass types: `PlannedCall` and `Plan` ,
//! plus the `Proposal` shape a mutating call is held back as pending review.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single record in a result set: an attribute/value map, with a stable
/// `Id` key when it represents a CRM entity.
pub type Record = HashMap<String, serde_json::Value>;

/// Where `iterate_over` draws its fan-out sequence from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IterateSource {
    /// The name of an entry in `shared_result_sets`, or the literal
    /// sentinel `"previous_result"`.
    Named(String),
    /// A literal list supplied directly in the plan.
    Literal(Vec<serde_json::Value>),
}

/// One planned tool invocation, produced by either planning strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedCall {
    pub tool: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    #[serde(default)]
    pub reason: String,
    /// Name under which resulting rows are stored in `shared_result_sets`.
    #[serde(default)]
    pub store_as: Option<String>,
    /// Fan-out source. `None` means invoke once with `arguments` as given.
    #[serde(default)]
    pub iterate_over: Option<IterateSource>,
}

/// A plan produced by one planning pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub calls: Vec<PlannedCall>,
    #[serde(default)]
    pub needs_next_iteration: bool,
    #[serde(default)]
    pub needs_salesforce_data: Option<bool>,
}

impl Plan {
    pub fn empty() -> Self {
        Self {
            calls: Vec::new(),
            needs_next_iteration: false,
            needs_salesforce_data: None,
        }
    }
}

/// `create` or `update` — the action a held-back mutating call represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    Upsert,
}

/// One field in a proposal's editable field map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalField {
    pub name: String,
    pub value: serde_json::Value,
    pub label: String,
}

/// A pending mutating call held back for human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub object: String,
    pub action_type: ActionType,
    pub fields: Vec<ProposalField>,
    #[serde(default)]
    pub contact_count: Option<usize>,
    /// Related records fetched so far (e.g. contacts found for a campaign).
    #[serde(default)]
    pub related_records: Vec<Record>,
    /// Fields the schema allows editing, for in-place proposal review.
    #[serde(default)]
    pub available_fields: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_round_trips_through_json() {
        let plan = Plan {
            calls: vec![PlannedCall {
                tool: "query_contacts".into(),
                arguments: serde_json::json!({"language": "en"}),
                reason: "find contacts".into(),
                store_as: Some("contacts".into()),
                iterate_over: None,
            }],
            needs_next_iteration: true,
            needs_salesforce_data: Some(true),
        };
        let raw = serde_json::to_string(&plan).unwrap();
        let back: Plan = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.calls.len(), 1);
        assert!(back.needs_next_iteration);
    }

    #[test]
    fn empty_plan_parses_from_minimal_json() {
        let raw = r#"{"calls": [], "needs_next_iteration": false}"#;
        let plan: Plan = serde_json::from_str(raw).unwrap();
        assert!(plan.calls.is_empty());
        assert!(plan.needs_salesforce_data.is_none());
    }

    #[test]
    fn iterate_over_named_or_literal() {
        let named: IterateSource = serde_json::from_str(r#""contacts""#).unwrap();
        assert!(matches!(named, IterateSource::Named(s) if s == "contacts"));

        let literal: IterateSource = serde_json::from_str(r#"[{"a":1}]"#).unwrap();
        assert!(matches!(literal, IterateSource::Literal(v) if v.len() == 1));
    }
}
