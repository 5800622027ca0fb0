//! Generic Planner (C5): `call_mcp_v2` is the single entry point
//! parameterized by a service's `planning_strategy`, shared by the Generic
//! Dynamic Caller (C4) and the specialized workflows (C8), each of which
//! just needs "run whatever calls this service needs, stopping for approval
//! on the first mutating one."

pub mod batch;
pub mod exec;
pub mod internal_tool;
pub mod model_planner;

use std::collections::HashMap;
use std::sync::Arc;

use conductor_domain::config::{PlanningStrategy, ServiceConfig};
use conductor_domain::plan::{Plan, Proposal, Record};
use conductor_domain::session::ToolResult;
use conductor_providers::LlmProvider;
use serde_json::Value;

use crate::transport::ToolTransport;
use internal_tool::InternalToolOutcome;
use model_planner::{ModelPlannerInputs, run_model_planner};

/// What `call_mcp_v2` produced, independent of which strategy ran.
pub enum PlannerOutcome {
    Completed { tool_results: Vec<ToolResult>, iterations: u32 },
    Proposal { tool_results: Vec<ToolResult>, proposal: Proposal, remaining_plan: Plan },
}

/// Extra context an `llm_planner` pass needs beyond what `ServiceConfig`
/// already carries; callers assemble this (C4/C9) and hand it through
/// unchanged.
pub struct LlmPlannerContext<'a> {
    pub user_goal: &'a str,
    pub task_directive: Option<&'a str>,
    pub schema_context: &'a str,
    pub workflow_context: Option<&'a str>,
    pub available_context: &'a Value,
}

/// Dispatch one service's planning pass.
///
/// `plan_override`, when `Some`, short-circuits strategy selection entirely:
/// every call in it executes directly and unconditionally, with no safety
/// gate ( — this plan already passed
/// through human review once).
pub async fn call_mcp_v2(
    service: &ServiceConfig,
    plan_override: Option<Plan>,
    llm_ctx: LlmPlannerContext<'_>,
    provider: Option<Arc<dyn LlmProvider>>,
    transport: &dyn ToolTransport,
    result_sets: &mut HashMap<String, Vec<Record>>,
) -> PlannerOutcome {
    if let Some(plan) = plan_override {
        let mut tool_results = Vec::new();
        for call in &plan.calls {
            let results = exec::execute_one_call(&service.id, call, transport, result_sets).await;
            tool_results.extend(results);
        }
        return PlannerOutcome::Completed { tool_results, iterations: 1 };
    }

    match service.planning_strategy {
        PlanningStrategy::InternalTool => run_internal_tool_strategy(service, transport, result_sets).await,
        PlanningStrategy::LlmPlanner => {
            run_llm_planner_strategy(service, llm_ctx, provider, transport, result_sets).await
        }
    }
}

async fn run_internal_tool_strategy(
    service: &ServiceConfig,
    transport: &dyn ToolTransport,
    result_sets: &mut HashMap<String, Vec<Record>>,
) -> PlannerOutcome {
    let Some(planning_tool) = &service.planning_tool_name else {
        tracing::error!(service = %service.id, "internal_tool strategy with no planning_tool_name configured");
        return PlannerOutcome::Completed { tool_results: vec![], iterations: 0 };
    };

    let plan = match transport.call_tool(&service.id, planning_tool, Value::Null).await {
        Ok(outcome) if !outcome.is_error => parse_plan_from_outcome(&outcome),
        Ok(outcome) => {
            tracing::warn!(service = %service.id, error = ?outcome.error_message, "planning tool call failed");
            Plan::empty()
        }
        Err(e) => {
            tracing::warn!(service = %service.id, error = %e, "planning tool call errored");
            Plan::empty()
        }
    };

    match internal_tool::run_internal_tool_plan(&service.id, plan, transport, result_sets).await {
        InternalToolOutcome::Completed { tool_results } => {
            PlannerOutcome::Completed { tool_results, iterations: 1 }
        }
        InternalToolOutcome::Proposal { tool_results, proposal, remaining_plan } => {
            PlannerOutcome::Proposal { tool_results, proposal, remaining_plan }
        }
    }
}

fn parse_plan_from_outcome(outcome: &crate::transport::ToolOutcome) -> Plan {
    if let Some(rows) = &outcome.rows {
        if let Some(first) = rows.first() {
            if let Ok(plan) = serde_json::from_value::<Plan>(first.clone()) {
                return plan;
            }
        }
    }
    match serde_json::from_str::<Plan>(outcome.raw_text.trim()) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!(error = %e, "planning tool response did not parse as a plan");
            Plan::empty()
        }
    }
}

async fn run_llm_planner_strategy(
    service: &ServiceConfig,
    llm_ctx: LlmPlannerContext<'_>,
    provider: Option<Arc<dyn LlmProvider>>,
    transport: &dyn ToolTransport,
    result_sets: &mut HashMap<String, Vec<Record>>,
) -> PlannerOutcome {
    let Some(provider) = provider else {
        tracing::error!(service = %service.id, "llm_planner strategy with no provider available");
        return PlannerOutcome::Completed { tool_results: vec![], iterations: 0 };
    };

    let tools = transport.tool_defs(&service.id);
    let prompt_template = service.planning_prompt_template.as_deref().unwrap_or(
        "You are a planning assistant. Given the goal and context, respond with a JSON plan \
         object: {\"calls\": [...], \"needs_next_iteration\": bool}.",
);

    let inputs = ModelPlannerInputs {
        service_id: &service.id,
        user_goal: llm_ctx.user_goal,
        task_directive: llm_ctx.task_directive,
        schema_context: llm_ctx.schema_context,
        workflow_context: llm_ctx.workflow_context,
        available_context: llm_ctx.available_context,
        prompt_template,
        tools: &tools,
    };

    let outcome = run_model_planner(inputs, provider, transport, result_sets).await;
    PlannerOutcome::Completed { tool_results: outcome.tool_results, iterations: outcome.iterations_run }
}
