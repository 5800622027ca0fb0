//! Trait boundary over the Tool Transport Adapter , mirroring how
//! `conductor-context::index::SchemaIndex` hides the vector index: the
//! orchestrator depends on this trait, not on `conductor-mcp-client::McpManager`
//! directly, so planner/workflow tests can fake a tool service without
//! spawning a subprocess.

use std::sync::Arc;

use async_trait::async_trait;
use conductor_domain::tool::ToolDefinition;
use serde_json::Value;

/// The outcome of one `tools/call`, already normalized.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub rows: Option<Vec<Value>>,
    pub is_error: bool,
    /// Best-effort human-readable error, when `is_error`.
    pub error_message: Option<String>,
    pub raw_text: String,
}

#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn call_tool(
        &self,
        service: &str,
        tool: &str,
        arguments: Value,
) -> conductor_domain::error::Result<ToolOutcome>;

    /// Tool descriptors known for this service (from the startup preload).
    fn tool_defs(&self, service: &str) -> Vec<ToolDefinition>;
}

fn to_tool_definition(def: &conductor_mcp_client::McpToolDef) -> ToolDefinition {
    ToolDefinition {
        name: def.name.clone(),
        description: def.description.clone(),
        parameters: def.input_schema.clone(),
    }
}

#[async_trait]
impl ToolTransport for conductor_mcp_client::McpManager {
    async fn call_tool(
        &self,
        service: &str,
        tool: &str,
        arguments: Value,
) -> conductor_domain::error::Result<ToolOutcome> {
        let result = conductor_mcp_client::McpManager::call_tool(self, service, tool, arguments)
            .await
            .map_err(conductor_domain::error::Error::from)?;

        let is_error = conductor_mcp_client::is_error(&result);
        let rows = conductor_mcp_client::extract_rows(&result);
        let raw_text = result
            .content
            .iter()
            .find(|p| p.content_type == "text")
            .map(|p| p.text.clone())
            .unwrap_or_default();
        let error_message = is_error.then(|| raw_text.clone());

        Ok(ToolOutcome { rows, is_error, error_message, raw_text })
    }

    fn tool_defs(&self, service: &str) -> Vec<ToolDefinition> {
        self.tools_for_service(service)
            .map(|defs| defs.iter().map(to_tool_definition).collect())
            .unwrap_or_default()
    }
}

pub type SharedTransport = Arc<dyn ToolTransport>;

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A fake [`ToolTransport`] for planner/workflow unit tests: returns
    /// scripted outcomes keyed by `(service, tool)` and records every call it
    /// received so tests can assert dispatch counts/ordering.
    pub struct FakeTransport {
        pub defs: HashMap<String, Vec<ToolDefinition>>,
        pub responses: Mutex<HashMap<String, Vec<ToolOutcome>>>,
        pub calls: Mutex<Vec<(String, String, Value)>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self {
                defs: HashMap::new(),
                responses: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_def(mut self, service: &str, def: ToolDefinition) -> Self {
            self.defs.entry(service.to_string()).or_default().push(def);
            self
        }

        /// Queue the next response(s) for `tool`, consumed in FIFO order.
        pub fn push_response(&self, tool: &str, outcome: ToolOutcome) {
            self.responses
                .lock()
                .unwrap()
                .entry(tool.to_string())
                .or_default()
                .push(outcome);
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn calls_for(&self, tool: &str) -> Vec<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, t, _)| t == tool)
                .map(|(_, _, args)| args.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ToolTransport for FakeTransport {
        async fn call_tool(
            &self,
            service: &str,
            tool: &str,
            arguments: Value,
) -> conductor_domain::error::Result<ToolOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push((service.to_string(), tool.to_string(), arguments));
            let mut responses = self.responses.lock().unwrap();
            let queue = responses.entry(tool.to_string()).or_default();
            if queue.is_empty() {
                return Ok(ToolOutcome {
                    rows: Some(vec![]),
                    is_error: false,
                    error_message: None,
                    raw_text: "[]".into(),
                });
            }
            Ok(queue.remove(0))
        }

        fn tool_defs(&self, service: &str) -> Vec<ToolDefinition> {
            self.defs.get(service).cloned().unwrap_or_default()
        }
    }

    pub fn outcome_rows(rows: Vec<Value>) -> ToolOutcome {
        ToolOutcome {
            rows: Some(rows),
            is_error: false,
            error_message: None,
            raw_text: String::new(),
        }
    }

    pub fn outcome_error(message: &str) -> ToolOutcome {
        ToolOutcome {
            rows: None,
            is_error: true,
            error_message: Some(message.to_string()),
            raw_text: message.to_string(),
        }
    }
}
