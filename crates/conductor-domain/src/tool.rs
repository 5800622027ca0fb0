use serde::{Deserialize, Serialize};

/// Internal tool call format (provider-agnostic).
/// Every LLM adapter converts provider-specific tool calls to/from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Tool descriptor exposed to the LLM and cached process-wide after startup.
///
/// `parameters` is the input JSON-shape with typed properties, as returned
/// by the tool transport's discovery call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// `true` if this tool's name or schema marks it as able to accept many
    /// records in one call (see the batch-vs-iterate classification,
    ///).
    pub fn is_batch_capable(&self) -> bool {
        if self.name.contains("batch") {
            return true;
        }
        self.batch_parameter_name().is_some()
    }

    /// The first batch-parameter name present in this tool's schema,
    /// by priority order.
    pub fn batch_parameter_name(&self) -> Option<&'static str> {
        const PRIORITY: &[&str] = &[
            "message_versions",
            "records",
            "recipients",
            "items",
            "batch_data",
        ];
        let props = self.parameters.get("properties")?.as_object()?;
        PRIORITY.iter().copied().find(|name| {
            props
                .get(*name)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str())
                == Some("array")
        })
    }
}

/// A message in the conversation (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Parts(vec![ContentPart::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error: false,
            }]),
        }
    }
}

impl MessageContent {
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t.as_str()),
            MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }

    /// Extract and join all text content, returning an owned String.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_all_text_from_text_variant() {
        let content = MessageContent::Text("hello world".into());
        assert_eq!(content.extract_all_text(), "hello world");
    }

    #[test]
    fn batch_capable_by_name() {
        let tool = ToolDefinition {
            name: "send_batch_emails".into(),
            description: String::new(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        };
        assert!(tool.is_batch_capable());
    }

    #[test]
    fn batch_capable_by_schema_priority() {
        let tool = ToolDefinition {
            name: "upsert_records".into(),
            description: String::new(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "recipients": {"type": "array"},
                    "records": {"type": "array"},
                }
            }),
        };
        // `records` outranks `recipients` in priority order.
        assert_eq!(tool.batch_parameter_name(), Some("records"));
    }

    #[test]
    fn not_batch_capable_without_array_param() {
        let tool = ToolDefinition {
            name: "get_contact".into(),
            description: String::new(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "id": {"type": "string"} }
            }),
        };
        assert!(!tool.is_batch_capable());
        assert_eq!(tool.batch_parameter_name(), None);
    }
}
