//! Shared per-call execution: resolves a `PlannedCall`'s fan-out source,
//! classifies batch-vs-iterate, resolves placeholders, invokes the tool via
//! the transport adapter, and folds extracted rows back into the shared
//! result-set map. Used by both planning strategies and by plan-override
//! resumption, since both describe the same per-call mechanics once a
//! plan (generated or overridden) is in hand.

use std::collections::HashMap;

use conductor_domain::plan::{IterateSource, PlannedCall, Record};
use conductor_domain::session::{CallStatus, ToolResult};
use serde_json::Value;

use crate::placeholder;
use crate::planner::batch::assemble_batch_arguments;
use crate::transport::ToolTransport;

fn value_to_record(v: &Value) -> Record {
    match v.as_object() {
        Some(map) => map.clone().into_iter().collect(),
        None => {
            let mut r = Record::new();
            r.insert("value".into(), v.clone());
            r
        }
    }
}

fn rows_to_records(rows: &[Value]) -> Vec<Record> {
    rows.iter().map(value_to_record).collect()
}

/// Resolve an `iterate_over` source against the accumulated result sets.
/// `None` means the source is absent — point 4 treats this as an
/// error, not an empty fan-out.
fn resolve_iterate_source(
    source: &IterateSource,
    result_sets: &HashMap<String, Vec<Record>>,
) -> Option<Vec<Value>> {
    match source {
        IterateSource::Literal(items) => Some(items.clone()),
        IterateSource::Named(name) => result_sets
            .get(name.as_str())
            .map(|records| records.iter().map(|r| Value::Object(r.clone().into_iter().collect())).collect()),
    }
}

/// Execute one planned call (single invocation, batch invocation, or N
/// per-item invocations), updating `result_sets[store_as]` and the
/// `previous_result` alias, and returning the tool-result log entries this
/// call produced.
pub async fn execute_one_call(
    service_id: &str,
    call: &PlannedCall,
    transport: &dyn ToolTransport,
    result_sets: &mut HashMap<String, Vec<Record>>,
) -> Vec<ToolResult> {
    let tool_def = transport.tool_defs(service_id).into_iter().find(|t| t.name == call.tool);

    let Some(tool_def) = tool_def else {
        return vec![ToolResult {
            tool_name: call.tool.clone(),
            request: call.arguments.clone(),
            response: None,
            error: Some(format!("unknown tool '{}' on service '{service_id}'", call.tool)),
            status: CallStatus::Error,
            source_item: None,
            batch_size: None,
        }];
    };

    let Some(source) = &call.iterate_over else {
        return execute_single(service_id, call, &tool_def, None, transport, result_sets).await;
    };

    let Some(items) = resolve_iterate_source(source, result_sets) else {
        return vec![ToolResult {
            tool_name: call.tool.clone(),
            request: call.arguments.clone(),
            response: None,
            error: Some("iterate_over source is absent".into()),
            status: CallStatus::Error,
            source_item: None,
            batch_size: None,
        }];
    };

    if items.is_empty() {
        if let Some(name) = &call.store_as {
            result_sets.insert(name.clone(), vec![]);
        }
        return vec![];
    }

    if tool_def.is_batch_capable() {
        execute_batch(service_id, call, &tool_def, &items, transport, result_sets).await
    } else {
        execute_iterate(service_id, call, &tool_def, &items, transport, result_sets).await
    }
}

async fn execute_single(
    service_id: &str,
    call: &PlannedCall,
    tool_def: &conductor_domain::tool::ToolDefinition,
    source_item: Option<Value>,
    transport: &dyn ToolTransport,
    result_sets: &mut HashMap<String, Vec<Record>>,
) -> Vec<ToolResult> {
    let item_record = source_item.as_ref().map(value_to_record);
    let resolved_args = placeholder::resolve(&call.arguments, item_record.as_ref(), result_sets);

    let outcome = transport.call_tool(service_id, &tool_def.name, resolved_args.clone()).await;

    let result = match outcome {
        Ok(outcome) if !outcome.is_error => {
            let rows = outcome.rows.clone().unwrap_or_default();
            if let Some(name) = &call.store_as {
                result_sets.insert(name.clone(), rows_to_records(&rows));
            }
            result_sets.insert(
                conductor_domain::session::PREVIOUS_RESULT.to_string(),
                rows_to_records(&rows),
);
            ToolResult {
                tool_name: tool_def.name.clone(),
                request: resolved_args,
                response: Some(Value::Array(rows)),
                error: None,
                status: CallStatus::Success,
                source_item,
                batch_size: None,
            }
        }
        Ok(outcome) => ToolResult {
            tool_name: tool_def.name.clone(),
            request: resolved_args,
            response: None,
            error: Some(outcome.error_message.unwrap_or_else(|| "tool reported an error".into())),
            status: CallStatus::Error,
            source_item,
            batch_size: None,
        },
        Err(e) => ToolResult {
            tool_name: tool_def.name.clone(),
            request: resolved_args,
            response: None,
            error: Some(e.to_string()),
            status: CallStatus::Error,
            source_item,
            batch_size: None,
        },
    };
    vec![result]
}

async fn execute_batch(
    service_id: &str,
    call: &PlannedCall,
    tool_def: &conductor_domain::tool::ToolDefinition,
    items: &[Value],
    transport: &dyn ToolTransport,
    result_sets: &mut HashMap<String, Vec<Record>>,
) -> Vec<ToolResult> {
    let batch_param = tool_def.batch_parameter_name().unwrap_or("items");
    let mut base_args = call.arguments.clone();
    if let Some(obj) = base_args.as_object_mut() {
        obj.remove(batch_param);
    }
    let base_args = placeholder::resolve(&base_args, None, result_sets);

    let resolved_items: Vec<Value> = items
        .iter()
        .map(|item| {
            let item_record = value_to_record(item);
            placeholder::resolve(item, Some(&item_record), result_sets)
        })
        .collect();

    let final_args = assemble_batch_arguments(tool_def, &base_args, &resolved_items);
    let outcome = transport.call_tool(service_id, &tool_def.name, final_args.clone()).await;

    let result = match outcome {
        Ok(outcome) if !outcome.is_error => {
            let rows = outcome.rows.clone().unwrap_or_default();
            if let Some(name) = &call.store_as {
                result_sets.insert(name.clone(), rows_to_records(&rows));
            }
            result_sets.insert(
                conductor_domain::session::PREVIOUS_RESULT.to_string(),
                rows_to_records(&rows),
);
            ToolResult {
                tool_name: tool_def.name.clone(),
                request: final_args,
                response: Some(Value::Array(rows)),
                error: None,
                status: CallStatus::Success,
                source_item: None,
                batch_size: Some(items.len()),
            }
        }
        Ok(outcome) => ToolResult {
            tool_name: tool_def.name.clone(),
            request: final_args,
            response: None,
            error: Some(outcome.error_message.unwrap_or_else(|| "tool reported an error".into())),
            status: CallStatus::Error,
            source_item: None,
            batch_size: Some(items.len()),
        },
        Err(e) => ToolResult {
            tool_name: tool_def.name.clone(),
            request: final_args,
            response: None,
            error: Some(e.to_string()),
            status: CallStatus::Error,
            source_item: None,
            batch_size: Some(items.len()),
        },
    };
    vec![result]
}

/// Per-item calls, issued serially in the iteration source's order (
/// ordering guarantee); `store_as` publishes the accumulated list only after
/// every per-item call has finished.
async fn execute_iterate(
    service_id: &str,
    call: &PlannedCall,
    tool_def: &conductor_domain::tool::ToolDefinition,
    items: &[Value],
    transport: &dyn ToolTransport,
    result_sets: &mut HashMap<String, Vec<Record>>,
) -> Vec<ToolResult> {
    let mut results = Vec::with_capacity(items.len());
    let mut accumulated_rows: Vec<Value> = Vec::new();

    for item in items {
        let item_record = value_to_record(item);
        let resolved_args = placeholder::resolve(&call.arguments, Some(&item_record), result_sets);
        let outcome = transport.call_tool(service_id, &tool_def.name, resolved_args.clone()).await;

        let result = match outcome {
            Ok(outcome) if !outcome.is_error => {
                let rows = outcome.rows.clone().unwrap_or_default();
                accumulated_rows.extend(rows.iter().cloned());
                ToolResult {
                    tool_name: tool_def.name.clone(),
                    request: resolved_args,
                    response: Some(Value::Array(rows)),
                    error: None,
                    status: CallStatus::Success,
                    source_item: Some(item.clone()),
                    batch_size: None,
                }
            }
            Ok(outcome) => ToolResult {
                tool_name: tool_def.name.clone(),
                request: resolved_args,
                response: None,
                error: Some(outcome.error_message.unwrap_or_else(|| "tool reported an error".into())),
                status: CallStatus::Error,
                source_item: Some(item.clone()),
                batch_size: None,
            },
            Err(e) => ToolResult {
                tool_name: tool_def.name.clone(),
                request: resolved_args,
                response: None,
                error: Some(e.to_string()),
                status: CallStatus::Error,
                source_item: Some(item.clone()),
                batch_size: None,
            },
        };
        results.push(result);
    }

    if let Some(name) = &call.store_as {
        result_sets.insert(name.clone(), rows_to_records(&accumulated_rows));
    }
    result_sets.insert(
        conductor_domain::session::PREVIOUS_RESULT.to_string(),
        rows_to_records(&accumulated_rows),
);

    results
}
