//! Schema Context Builder : picks primary/secondary objects,
//! infers junction entities, selects fields per object, evaluates default
//! expressions, and composes the planner's system-prompt schema block.
//!
//! Grounded on `crates/contextpack/src/builder.rs`'s `ContextPackBuilder`
//! shape — a pure builder over pre-fetched inputs producing (assembled
//! text, report) — re-targeted from workspace Markdown files to CRM
//! object/field schemas resolved through [`crate::index::SchemaIndex`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use conductor_domain::config::SchemaContextConfig;
use futures_util::future::join_all;

use crate::defaults;
use crate::index::{FieldMatch, SchemaIndex};
use crate::injection;
use crate::report::{ObjectSelectionReport, SchemaContextReport};
use crate::required_fields::required_fields_for;

const READ_VERBS: &[&str] = &[
    "find", "search", "get", "list", "show", "query", "lookup", "fetch",
];

fn is_read_query(query: &str) -> bool {
    let lower = query.to_lowercase();
    READ_VERBS.iter().any(|v| lower.contains(v))
}

fn push_unique(ordered: &mut Vec<FieldMatch>, seen: &mut HashSet<String>, m: FieldMatch) {
    if seen.insert(m.name.clone()) {
        ordered.push(m);
    }
}

/// A field resolved into the planner prompt, after the cap/union logic.
#[derive(Debug, Clone)]
pub struct SelectedField {
    pub name: String,
    pub field_type: String,
    pub description: String,
}

pub struct SchemaContextBuilder {
    index: Arc<dyn SchemaIndex>,
    config: SchemaContextConfig,
}

impl SchemaContextBuilder {
    pub fn new(index: Arc<dyn SchemaIndex>, config: SchemaContextConfig) -> Self {
        Self { index, config }
    }

    /// Build the planning prompt's schema-context block.
    ///
    /// `context_hint` is an optional explicit primary-object override (e.g.
    /// a service config pinning one entity via `required_context`).
    pub async fn build(
        &self,
        query: &str,
        now: DateTime<Utc>,
        context_hint: Option<&str>,
) -> (String, SchemaContextReport) {
        let (primary, secondary) = self.select_objects(query, context_hint).await;
        let Some(primary) = primary else {
            return (String::new(), SchemaContextReport::default());
        };

        let mut selected = vec![primary.clone()];
        selected.extend(secondary);

        let junctions = self.infer_junctions(&selected);
        let junction_set: HashSet<String> = junctions.iter().cloned().collect();
        selected.extend(junctions);

        let fields_per_object = join_all(selected.iter().map(|obj| self.select_fields(obj, query))).await;
        let defaults_per_object = join_all(selected.iter().map(|obj| self.evaluate_defaults(obj, now))).await;

        let mut prompt = String::new();
        let mut reports = Vec::with_capacity(selected.len());

        for ((object, fields), defaults) in selected
            .iter()
            .zip(fields_per_object.iter())
            .zip(defaults_per_object.iter())
        {
            prompt.push_str(&injection::format_object_schema(object, fields));
            prompt.push_str(&injection::format_mandatory_defaults(object, defaults));
            reports.push(ObjectSelectionReport {
                object: object.clone(),
                is_primary: *object == primary,
                is_junction: junction_set.contains(object),
                fields_selected: fields.len(),
                defaults_applied: defaults.len(),
            });
        }

        let report = SchemaContextReport {
            objects: reports,
            total_injected_chars: prompt.len(),
        };
        (prompt, report)
    }

    /// Top-K object search, threshold-filtered, with primary
    /// resolution order (a) context hint, (b) read/search-verb first match,
    /// (c) top-ranked match.
    async fn select_objects(
        &self,
        query: &str,
        context_hint: Option<&str>,
) -> (Option<String>, Vec<String>) {
        let matches = self.index.search_objects(query, self.config.object_top_k).await;
        let qualifying: Vec<_> = matches
            .into_iter()
            .filter(|m| m.distance < self.config.object_max_distance)
            .collect();
        if qualifying.is_empty() {
            return (None, Vec::new());
        }

        // (b) and (c) both resolve to the nearest match, since the index
        // already returns matches nearest-first — only a context hint can
        // move the primary off the top of that ordering.
        let _ = is_read_query(query);
        let primary_idx = context_hint
            .and_then(|hint| qualifying.iter().position(|m| m.name.eq_ignore_ascii_case(hint)))
            .unwrap_or(0);

        let primary = qualifying[primary_idx].name.clone();
        let secondary = qualifying
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != primary_idx)
            .map(|(_, m)| m.name.clone())
            .collect();
        (Some(primary), secondary)
    }

    /// Any entity with ≥2 `*Id`-suffixed fields that connects
    /// at least two of the already-selected objects.
    fn infer_junctions(&self, selected: &[String]) -> Vec<String> {
        let selected_set: HashSet<&str> = selected.iter().map(String::as_str).collect();
        let mut junctions = Vec::new();
        for (entity, refs) in self.index.adjacency() {
            if selected_set.contains(entity.as_str()) || refs.len() < 2 {
                continue;
            }
            let connects = refs.iter().filter(|r| selected_set.contains(r.as_str())).count();
            if connects >= 2 {
                junctions.push(entity.clone());
            }
        }
        junctions
    }

    /// Always `Id`/`Name`/top hit, then by distance up to the
    /// cap, unioned with the hard-coded required-field set.
    async fn select_fields(&self, object: &str, query: &str) -> Vec<SelectedField> {
        let matches = self.index.search_fields(object, query, self.config.field_top_k).await;

        let mut ordered: Vec<FieldMatch> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        if let Some(id_field) = matches.iter().find(|m| m.name == "Id") {
            push_unique(&mut ordered, &mut seen, id_field.clone());
        }
        if let Some(name_field) = matches.iter().find(|m| m.name == "Name") {
            push_unique(&mut ordered, &mut seen, name_field.clone());
        }
        if let Some(top) = matches.first() {
            push_unique(&mut ordered, &mut seen, top.clone());
        }
        for m in matches.iter().filter(|m| m.distance < self.config.field_max_distance) {
            if ordered.len() >= self.config.field_cap {
                break;
            }
            push_unique(&mut ordered, &mut seen, m.clone());
        }

        for required in required_fields_for(object) {
            if !seen.contains(*required) {
                ordered.push(FieldMatch {
                    name: required.to_string(),
                    distance: 0.0,
                    field_type: "string".into(),
                    description: String::new(),
                });
                seen.insert(required.to_string());
            }
        }

        ordered
            .into_iter()
            .map(|m| SelectedField {
                name: m.name,
                field_type: m.field_type,
                description: m.description,
            })
            .collect()
    }

    /// Fetch `needvalue=true` fields and evaluate their raw
    /// default expressions against `now`.
    async fn evaluate_defaults(&self, object: &str, now: DateTime<Utc>) -> Vec<(String, String)> {
        self.index
            .field_defaults(object)
            .await
            .into_iter()
            .map(|d| (d.name, defaults::evaluate(&d.default_expr, now)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ObjectMatch;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeIndex {
        adjacency: HashMap<String, Vec<String>>,
    }

    #[async_trait]
    impl SchemaIndex for FakeIndex {
        async fn search_objects(&self, _query: &str, _top_k: usize) -> Vec<ObjectMatch> {
            vec![
                ObjectMatch { name: "Campaign".into(), distance: 0.2 },
                ObjectMatch { name: "Contact".into(), distance: 0.9 },
                ObjectMatch { name: "Irrelevant".into(), distance: 3.0 },
            ]
        }

        async fn search_fields(&self, object: &str, _query: &str, _top_k: usize) -> Vec<FieldMatch> {
            match object {
                "Campaign" => vec![
                    FieldMatch { name: "Id".into(), distance: 0.0, field_type: "id".into(), description: "".into() },
                    FieldMatch { name: "Name".into(), distance: 0.1, field_type: "string".into(), description: "".into() },
                    FieldMatch { name: "StartDate".into(), distance: 0.5, field_type: "date".into(), description: "".into() },
                ],
                _ => vec![
                    FieldMatch { name: "Id".into(), distance: 0.0, field_type: "id".into(), description: "".into() },
                ],
            }
        }

        async fn field_defaults(&self, object: &str) -> Vec<crate::index::FieldDefault> {
            if object == "Campaign" {
                vec![crate::index::FieldDefault { name: "StartDate".into(), default_expr: "today".into() }]
            } else {
                vec![]
            }
        }

        fn adjacency(&self) -> &HashMap<String, Vec<String>> {
            &self.adjacency
        }
    }

    fn fake_index() -> Arc<dyn SchemaIndex> {
        let mut adjacency = HashMap::new();
        adjacency.insert(
            "CampaignMember".to_string(),
            vec!["Campaign".to_string(), "Contact".to_string()],
);
        Arc::new(FakeIndex { adjacency })
    }

    #[tokio::test]
    async fn selects_primary_and_secondary_under_distance_threshold() {
        let builder = SchemaContextBuilder::new(fake_index(), SchemaContextConfig::default());
        let (prompt, report) = builder.build("find campaign", Utc::now(), None).await;
        assert!(prompt.contains("SCHEMA: Campaign"));
        assert!(report.objects.iter().any(|o| o.object == "Campaign" && o.is_primary));
        assert!(report.objects.iter().any(|o| o.object == "Contact" && !o.is_primary));
        assert!(!report.objects.iter().any(|o| o.object == "Irrelevant"));
    }

    #[tokio::test]
    async fn infers_junction_entity_connecting_two_selected_objects() {
        let builder = SchemaContextBuilder::new(fake_index(), SchemaContextConfig::default());
        let (_prompt, report) = builder.build("find campaign", Utc::now(), None).await;
        assert!(report.objects.iter().any(|o| o.object == "CampaignMember" && o.is_junction));
    }

    #[tokio::test]
    async fn evaluates_mandatory_defaults_for_selected_object() {
        let builder = SchemaContextBuilder::new(fake_index(), SchemaContextConfig::default());
        let now = Utc::now();
        let (prompt, _report) = builder.build("find campaign", now, None).await;
        assert!(prompt.contains("MANDATORY_DEFAULTS: Campaign"));
        assert!(prompt.contains(&now.format("%Y-%m-%d").to_string()));
    }

    #[tokio::test]
    async fn context_hint_overrides_top_ranked_primary() {
        let builder = SchemaContextBuilder::new(fake_index(), SchemaContextConfig::default());
        let (_prompt, report) = builder.build("find campaign", Utc::now(), Some("Contact")).await;
        assert!(report.objects.iter().any(|o| o.object == "Contact" && o.is_primary));
    }

    #[tokio::test]
    async fn no_qualifying_objects_yields_empty_prompt() {
        struct EmptyIndex(HashMap<String, Vec<String>>);
        #[async_trait]
        impl SchemaIndex for EmptyIndex {
            async fn search_objects(&self, _q: &str, _k: usize) -> Vec<ObjectMatch> {
                vec![ObjectMatch { name: "Campaign".into(), distance: 5.0 }]
            }
            async fn search_fields(&self, _o: &str, _q: &str, _k: usize) -> Vec<FieldMatch> {
                vec![]
            }
            async fn field_defaults(&self, _o: &str) -> Vec<crate::index::FieldDefault> {
                vec![]
            }
            fn adjacency(&self) -> &HashMap<String, Vec<String>> {
                &self.0
            }
        }
        let builder = SchemaContextBuilder::new(Arc::new(EmptyIndex(HashMap::new())), SchemaContextConfig::default());
        let (prompt, report) = builder.build("find campaign", Utc::now(), None).await;
        assert!(prompt.is_empty());
        assert!(report.objects.is_empty());
    }
}
