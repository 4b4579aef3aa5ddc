//! Tool dispatch
//!
//! Single entry point between the reasoning loop and the registry.
//! A dispatch never fails the turn: unknown tools and tool errors
//! come back as error payloads the model can read and recover from.

use crate::error::AgentError;
use crate::models::{ToolTrace, TraceStatus};
use crate::tools::ToolRegistry;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Hard cap on items handed back to the model per list key
pub const MAX_ITEMS_IN_CONTEXT: usize = 50;

/// List keys subject to the context cap
const TRUNCATED_KEYS: [&str; 3] = ["deals", "work_orders", "lifecycle"];

/// What one tool call produced, regardless of success
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub trace: ToolTrace,
    pub caveats: Vec<String>,
    /// The JSON the model sees as the tool result
    pub result_for_llm: Value,
}

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, tool_name: &str, args: &Value) -> DispatchOutcome {
        let started = Instant::now();
        let timestamp = Utc::now();

        let Some(tool) = self.registry.get(tool_name) else {
            warn!(tool = %tool_name, "unknown tool requested");
            let message = AgentError::UnknownTool(tool_name.to_string()).to_string();
            return DispatchOutcome {
                trace: ToolTrace {
                    tool_name: tool_name.to_string(),
                    parameters: args.clone(),
                    status: TraceStatus::Error,
                    result_summary: message.clone(),
                    items_returned: 0,
                    cleaning_steps: Vec::new(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    api_time_ms: 0,
                    timestamp,
                },
                caveats: Vec::new(),
                result_for_llm: json!({ "error": message }),
            };
        };

        info!(tool = %tool_name, args = %args, "dispatching tool");

        match tool.execute(args).await {
            Ok(report) => {
                let result_for_llm = truncate_items(report.payload);
                info!(
                    tool = %tool_name,
                    items = report.item_count,
                    api_time_ms = report.api_time_ms,
                    "tool completed"
                );
                DispatchOutcome {
                    trace: ToolTrace {
                        tool_name: tool_name.to_string(),
                        parameters: args.clone(),
                        status: TraceStatus::Completed,
                        result_summary: report.summary,
                        items_returned: report.item_count,
                        cleaning_steps: report.cleaning_steps,
                        duration_ms: started.elapsed().as_millis() as u64,
                        api_time_ms: report.api_time_ms,
                        timestamp,
                    },
                    caveats: report.caveats,
                    result_for_llm,
                }
            }
            Err(e) => {
                warn!(tool = %tool_name, error = %e, "tool failed");
                let message = e.to_string();
                DispatchOutcome {
                    trace: ToolTrace {
                        tool_name: tool_name.to_string(),
                        parameters: args.clone(),
                        status: TraceStatus::Error,
                        result_summary: message.clone(),
                        items_returned: 0,
                        cleaning_steps: Vec::new(),
                        duration_ms: started.elapsed().as_millis() as u64,
                        api_time_ms: 0,
                        timestamp,
                    },
                    caveats: Vec::new(),
                    result_for_llm: json!({ "error": message }),
                }
            }
        }
    }
}

/// Cap the record lists in a tool payload before it reaches the model.
/// Aggregates in the payload stay computed over the full set; only the
/// per-record lists shrink, with markers so the model knows.
pub fn truncate_items(mut payload: Value) -> Value {
    let Some(obj) = payload.as_object_mut() else {
        return payload;
    };

    for key in TRUNCATED_KEYS {
        let total = match obj.get(key).and_then(|v| v.as_array()) {
            Some(items) if items.len() > MAX_ITEMS_IN_CONTEXT => items.len(),
            _ => continue,
        };
        if let Some(items) = obj.get_mut(key).and_then(|v| v.as_array_mut()) {
            items.truncate(MAX_ITEMS_IN_CONTEXT);
        }
        obj.insert(format!("{}_truncated", key), json!(true));
        obj.insert(format!("{}_total", key), json!(total));
    }

    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_lists_with_markers() {
        let payload = json!({
            "total_deals": 120,
            "deals": (0..120).map(|i| json!({"name": format!("Deal {}", i)})).collect::<Vec<_>>(),
        });

        let out = truncate_items(payload);

        assert_eq!(out["deals"].as_array().map(|a| a.len()), Some(50));
        assert_eq!(out["deals_truncated"], json!(true));
        assert_eq!(out["deals_total"], json!(120));
        // aggregate untouched
        assert_eq!(out["total_deals"], json!(120));
    }

    #[test]
    fn short_lists_pass_through_unmodified() {
        let payload = json!({
            "work_orders": (0..30).map(|i| json!({"serial": i})).collect::<Vec<_>>(),
        });

        let out = truncate_items(payload);

        assert_eq!(out["work_orders"].as_array().map(|a| a.len()), Some(30));
        assert!(out.get("work_orders_truncated").is_none());
        assert!(out.get("work_orders_total").is_none());
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_payload() {
        let dispatcher = Dispatcher::new(Arc::new(ToolRegistry::new()));

        let outcome = dispatcher.dispatch("no_such_tool", &json!({})).await;

        assert!(matches!(outcome.trace.status, TraceStatus::Error));
        assert_eq!(
            outcome.result_for_llm["error"],
            json!("Unknown tool: no_such_tool")
        );
    }
}
