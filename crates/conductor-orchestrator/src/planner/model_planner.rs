//! Model-planner strategy (C5.2): a bounded re-planning loop
//! that asks the LLM for the next batch of calls given everything gathered
//! so far, executes them, and re-asks until the model signals it's done or
//! the iteration cap is hit.

use std::collections::HashMap;
use std::sync::Arc;

use conductor_domain::plan::{IterateSource, Plan, Record};
use conductor_domain::session::ToolResult;
use conductor_domain::tool::{Message, ToolDefinition};
use conductor_providers::{ChatRequest, LlmProvider};
use serde_json::Value;

use crate::planner::exec::execute_one_call;
use crate::transport::ToolTransport;

/// Hard cap on re-planning passes within a single `call_mcp_v2`.
pub const MAX_ITERATIONS_INNER: u32 = 10;

/// Everything the prompt-assembly step needs that isn't already tracked by
/// the accumulating result sets.
pub struct ModelPlannerInputs<'a> {
    pub service_id: &'a str,
    pub user_goal: &'a str,
    pub task_directive: Option<&'a str>,
    /// Rendered by C9 (`SchemaContextBuilder::build`) for the relevant
    /// service's schema, or empty if the service has none.
    pub schema_context: &'a str,
    /// Free-text description of the active specialized workflow, if any
    /// .
    pub workflow_context: Option<&'a str>,
    /// Already-resolved values for the planning tool's `required_context`
    /// paths.
    pub available_context: &'a Value,
    pub prompt_template: &'a str,
    pub tools: &'a [ToolDefinition],
}

pub struct ModelPlannerOutcome {
    pub tool_results: Vec<ToolResult>,
    pub iterations_run: u32,
}

/// Run the bounded re-planning loop, mutating `result_sets` in place.
pub async fn run_model_planner(
    inputs: ModelPlannerInputs<'_>,
    provider: Arc<dyn LlmProvider>,
    transport: &dyn ToolTransport,
    result_sets: &mut HashMap<String, Vec<Record>>,
) -> ModelPlannerOutcome {
    let mut tool_results = Vec::new();
    let mut iterations_run = 0;

    for iteration in 0..MAX_ITERATIONS_INNER {
        let Some(query) = effective_query(&inputs, iteration, result_sets) else {
            break;
        };

        let prompt = build_prompt(&inputs, &query, result_sets);
        let request = ChatRequest {
            messages: vec![Message::system(inputs.prompt_template), Message::user(prompt)],
            tools: inputs.tools.to_vec(),
            temperature: Some(0.0),
            max_tokens: None,
            json_mode: true,
            model: None,
        };

        let plan = match provider.chat(request).await {
            Ok(response) => parse_plan_strict(&response.content),
            Err(e) => {
                tracing::warn!(error = %e, "model-planner chat call failed, treating as an empty plan");
                Plan::empty()
            }
        };

        iterations_run += 1;

        if plan.calls.is_empty() {
            break;
        }

        let mut iterated_previous_result = false;
        for call in &plan.calls {
            if matches!(&call.iterate_over, Some(IterateSource::Named(name)) if name == conductor_domain::session::PREVIOUS_RESULT)
            {
                iterated_previous_result = true;
            }
            let results = execute_one_call(inputs.service_id, call, transport, result_sets).await;
            tool_results.extend(results);
        }

        if !plan.needs_next_iteration || !iterated_previous_result {
            break;
        }
    }

    ModelPlannerOutcome { tool_results, iterations_run }
}

/// The query driving this iteration's prompt ( point 2): the
/// user's goal on the first pass, otherwise the active task directive if
/// one is set, otherwise "continue with previous results" as long as there
/// are any, otherwise the loop stops.
fn effective_query(
    inputs: &ModelPlannerInputs<'_>,
    iteration: u32,
    result_sets: &HashMap<String, Vec<Record>>,
) -> Option<String> {
    if iteration == 0 {
        return Some(inputs.user_goal.to_string());
    }
    if let Some(directive) = inputs.task_directive {
        return Some(directive.to_string());
    }
    if result_sets
        .get(conductor_domain::session::PREVIOUS_RESULT)
        .is_some_and(|rows| !rows.is_empty())
    {
        return Some("Continue the task using the previous results.".to_string());
    }
    None
}

fn build_prompt(
    inputs: &ModelPlannerInputs<'_>,
    query: &str,
    result_sets: &HashMap<String, Vec<Record>>,
) -> String {
    let mut sections = Vec::new();
    sections.push(format!("Goal: {query}"));

    if !inputs.schema_context.is_empty() {
        sections.push(format!("Schema context:\n{}", inputs.schema_context));
    }
    if let Some(wf) = inputs.workflow_context {
        sections.push(format!("Active workflow context:\n{wf}"));
    }

    sections.push(format!("Previous results:\n{}", render_previous_results(result_sets)));

    if !inputs.available_context.is_null() {
        sections.push(format!(
            "Available context:\n{}",
            serde_json::to_string_pretty(inputs.available_context).unwrap_or_default()
));
    }

    sections.join("\n\n")
}

/// Full dump when there are 10 or fewer accumulated rows total, otherwise a
/// sample plus count.
fn render_previous_results(result_sets: &HashMap<String, Vec<Record>>) -> String {
    let Some(rows) = result_sets.get(conductor_domain::session::PREVIOUS_RESULT) else {
        return "(none yet)".to_string();
    };
    if rows.is_empty() {
        return "(empty)".to_string();
    }
    if rows.len() <= 10 {
        serde_json::to_string_pretty(rows).unwrap_or_default()
    } else {
        let sample: Vec<_> = rows.iter().take(3).collect();
        format!(
            "{} rows total, sample:\n{}",
            rows.len(),
            serde_json::to_string_pretty(&sample).unwrap_or_default()
)
    }
}

/// Strict plan parsing ( point 3): trim whitespace, strip a
/// leading/trailing markdown code fence if present, then parse as JSON with
/// no tolerance for comments or trailing content. Any failure degrades to an
/// empty, non-continuing plan rather than erroring the turn.
fn parse_plan_strict(raw: &str) -> Plan {
    let trimmed = strip_markdown_fence(raw.trim());
    match serde_json::from_str::<Plan>(trimmed) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!(error = %e, raw = %trimmed, "failed to parse planner output, degrading to an empty plan");
            Plan::empty()
        }
    }
}

fn strip_markdown_fence(s: &str) -> &str {
    let s = s.strip_prefix("```json").or_else(|| s.strip_prefix("```")).unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::{outcome_rows, FakeTransport};
    use async_trait::async_trait;
    use conductor_domain::capability::LlmCapabilities;
    use conductor_domain::stream::{BoxStream, StreamEvent};
    use std::sync::Mutex;

    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
        capabilities: LlmCapabilities,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(String::from).rev().collect()),
                capabilities: LlmCapabilities::default(),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, _req: ChatRequest) -> conductor_domain::error::Result<conductor_providers::ChatResponse> {
            let content = self.responses.lock().unwrap().pop().unwrap_or_else(|| "{}".into());
            Ok(conductor_providers::ChatResponse {
                content,
                tool_calls: vec![],
                usage: None,
                model: "fake".into(),
                finish_reason: Some("stop".into()),
            })
        }

        async fn chat_stream(&self, _req: ChatRequest) -> conductor_domain::error::Result<BoxStream<'static, conductor_domain::error::Result<StreamEvent>>> {
            unimplemented!("not used by the planner")
        }

        async fn embeddings(
            &self,
            _req: conductor_providers::EmbeddingsRequest,
) -> conductor_domain::error::Result<conductor_providers::EmbeddingsResponse> {
            unimplemented!("not used by the planner")
        }

        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }

        fn provider_id(&self) -> &str {
            "fake"
        }
    }

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: String::new(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    #[test]
    fn strips_json_code_fence_before_parsing() {
        let raw = "```json\n{\"calls\": [], \"needs_next_iteration\": false}\n```";
        let plan = parse_plan_strict(raw);
        assert!(plan.calls.is_empty());
    }

    #[test]
    fn malformed_plan_degrades_to_empty() {
        let plan = parse_plan_strict("not json at all");
        assert!(plan.calls.is_empty());
        assert!(!plan.needs_next_iteration);
    }

    #[tokio::test]
    async fn stops_after_model_returns_no_further_calls() {
        let transport = FakeTransport::new().with_def("salesforce", tool("query_contacts"));
        transport.push_response("query_contacts", outcome_rows(vec![serde_json::json!({"Id": "1"})]));

        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new(vec![
            r#"{"calls": [{"tool": "query_contacts", "arguments": {}, "store_as": "contacts"}], "needs_next_iteration": false}"#,
        ]));

        let inputs = ModelPlannerInputs {
            service_id: "salesforce",
            user_goal: "find contacts",
            task_directive: None,
            schema_context: "",
            workflow_context: None,
            available_context: &Value::Null,
            prompt_template: "You are a planner.",
            tools: &[tool("query_contacts")],
        };

        let mut sets = HashMap::new();
        let outcome = run_model_planner(inputs, provider, &transport, &mut sets).await;
        assert_eq!(outcome.iterations_run, 1);
        assert_eq!(outcome.tool_results.len(), 1);
        assert_eq!(sets["contacts"].len(), 1);
    }

    #[tokio::test]
    async fn loop_continues_while_iterating_previous_result_and_needs_next_iteration() {
        let transport = FakeTransport::new().with_def("salesforce", tool("query_contacts"));
        transport.push_response("query_contacts", outcome_rows(vec![serde_json::json!({"Id": "1"})]));
        transport.push_response("query_contacts", outcome_rows(vec![serde_json::json!({"Id": "1"})]));

        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new(vec![
            r#"{"calls": [{"tool": "query_contacts", "arguments": {}, "store_as": "contacts"}], "needs_next_iteration": true}"#,
            r#"{"calls": [{"tool": "query_contacts", "arguments": {}, "iterate_over": "previous_result"}], "needs_next_iteration": false}"#,
        ]));

        let inputs = ModelPlannerInputs {
            service_id: "salesforce",
            user_goal: "find contacts",
            task_directive: None,
            schema_context: "",
            workflow_context: None,
            available_context: &Value::Null,
            prompt_template: "You are a planner.",
            tools: &[tool("query_contacts")],
        };

        let mut sets = HashMap::new();
        let outcome = run_model_planner(inputs, provider, &transport, &mut sets).await;
        assert_eq!(outcome.iterations_run, 2);
    }

    #[tokio::test]
    async fn iteration_cap_bounds_the_loop_even_if_model_keeps_asking_for_more() {
        let transport = FakeTransport::new().with_def("salesforce", tool("query_contacts"));
        for _ in 0..MAX_ITERATIONS_INNER {
            transport.push_response("query_contacts", outcome_rows(vec![serde_json::json!({"Id": "1"})]));
        }
        let scripted = vec![
            r#"{"calls": [{"tool": "query_contacts", "arguments": {}, "iterate_over": "previous_result", "store_as": "contacts"}], "needs_next_iteration": true}"#;
            MAX_ITERATIONS_INNER as usize
        ];
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new(scripted));

        let inputs = ModelPlannerInputs {
            service_id: "salesforce",
            user_goal: "find contacts",
            task_directive: Some("keep going"),
            schema_context: "",
            workflow_context: None,
            available_context: &Value::Null,
            prompt_template: "You are a planner.",
            tools: &[tool("query_contacts")],
        };

        let mut sets = HashMap::new();
        sets.insert(conductor_domain::session::PREVIOUS_RESULT.to_string(), vec![Record::new()]);
        let outcome = run_model_planner(inputs, provider, &transport, &mut sets).await;
        assert_eq!(outcome.iterations_run, MAX_ITERATIONS_INNER);
    }
}
