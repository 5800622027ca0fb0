//! The per-service planning registry: for each tool service behind the
//! transport adapter, which planning strategy drives it, and what a
//! model-planner pass needs to build its prompt.
//!
//! Kept distinct from [`crate::config::McpConfig`] — `McpServerConfig`
//! describes how to *start* a service's subprocess, this describes how the
//! orchestrator *plans against* it. The two are joined by `id`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceRegistryConfig {
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl ServiceRegistryConfig {
    pub fn find(&self, id: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.id == id)
    }

    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.id.as_str()).collect()
    }
}

/// One entry in the planning registry: per service, which planning
/// strategy drives it, an optional planning tool/prompt template, and
/// the context fields it requires. `executionEndpoint` itself lives on
/// the matching `McpServerConfig` (argv for the subprocess) — this
/// struct only carries the planning-time concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub planning_strategy: PlanningStrategy,
    /// Required when `planning_strategy = internal_tool`: the name of the
    /// tool on this service whose job is to return a plan.
    #[serde(default)]
    pub planning_tool_name: Option<String>,
    /// A string with `{placeholder}` substitutions resolved against the
    /// Session State , used only by the `llm_planner` strategy.
    #[serde(default)]
    pub planning_prompt_template: Option<String>,
    /// Dotted paths into Session State the planning prompt must resolve
    /// and inject ( step 2 "available-context block").
    #[serde(default)]
    pub required_context: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningStrategy {
    InternalTool,
    LlmPlanner,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_id() {
        let registry = ServiceRegistryConfig {
            services: vec![ServiceConfig {
                id: "salesforce".into(),
                description: "CRM".into(),
                planning_strategy: PlanningStrategy::InternalTool,
                planning_tool_name: Some("plan_crm_calls".into()),
                planning_prompt_template: None,
                required_context: vec![],
            }],
        };
        assert!(registry.find("salesforce").is_some());
        assert!(registry.find("missing").is_none());
    }

    #[test]
    fn deserializes_llm_planner_variant() {
        let raw = r#"{"id": "brevo", "planning_strategy": "llm_planner", "required_context": ["shared_result_sets.campaign"]}"#;
        let svc: ServiceConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(svc.planning_strategy, PlanningStrategy::LlmPlanner);
        assert_eq!(svc.required_context, vec!["shared_result_sets.campaign"]);
    }
}
