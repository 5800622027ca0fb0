mod limits;
mod llm;
mod mcp;
mod schema_context;
mod server;
mod services;
mod sessions;

pub use limits::*;
pub use llm::*;
pub use mcp::*;
pub use schema_context::*;
pub use server::*;
pub use services::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The root configuration for the gateway process.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub schema_context: SchemaContextConfig,
    #[serde(default)]
    pub services: ServiceRegistryConfig,
}

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration, returning every issue found (empty when
    /// everything looks good). Errors block startup; warnings don't.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be non-zero".into(),
            });
        }

        if self.sessions.max_iterations == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.max_iterations".into(),
                message: "must allow at least one planner/executor iteration".into(),
            });
        }

        if self.mcp.servers.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "mcp.servers".into(),
                message: "no tool services configured; every routed turn will fail".into(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for server in &self.mcp.servers {
            if !seen.insert(server.id.as_str()) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "mcp.servers".into(),
                    message: format!("duplicate service id '{}'", server.id),
                });
            }
            if server.command.is_empty() && server.transport == McpTransportKind::Stdio {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("mcp.servers[{}].command", server.id),
                    message: "stdio transport requires a command".into(),
                });
            }
        }

        if self.llm.providers.is_empty() && self.llm.startup_policy == LlmStartupPolicy::RequireOne
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.providers".into(),
                message: "startup_policy is require_one but no providers are configured".into(),
            });
        }

        for service in &self.services.services {
            if service.planning_strategy == PlanningStrategy::InternalTool
                && service.planning_tool_name.is_none()
            {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("services[{}].planning_tool_name", service.id),
                    message: "internal_tool strategy requires planning_tool_name".into(),
                });
            }
            if self.mcp.find(&service.id).is_none() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("services[{}]", service.id),
                    message: "no matching mcp.servers entry; this service can never be dispatched"
                        .into(),
                });
            }
        }

        if !self.llm.roles.contains_key("planner") {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "llm.roles".into(),
                message: "no 'planner' role configured; the model-planner strategy will fail"
                    .into(),
            });
        }

        errors
    }

    /// `true` if validation found no `Error`-severity issues.
    pub fn is_valid(&self) -> bool {
        !self
            .validate()
            .iter()
            .any(|e| e.severity == ConfigSeverity::Error)
    }
}

impl PartialEq for ConfigSeverity {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (ConfigSeverity::Error, ConfigSeverity::Error)
                | (ConfigSeverity::Warning, ConfigSeverity::Warning)
        )
    }
}
impl Eq for ConfigSeverity {}
