//! Tool trait and registry
//!
//! Tools are deterministic data operations over the two boards. Every
//! tool fetches live board data, runs it through the cleaning pipeline,
//! and returns a uniform [`ToolReport`] the dispatcher can consume
//! without inspecting payload shapes.

pub mod dispatch;

use crate::board::{parse_items_to_records, BoardClient};
use crate::clean::{self, Deal, WorkOrder};
use crate::config::Config;
use crate::error::AgentError;
use crate::metrics::{
    self, breakdown, format_currency, group_by, lifecycle_join, sum_values, DealFilters,
    WorkOrderFilters,
};
use crate::Result;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Uniform envelope every tool returns
#[derive(Debug, Clone)]
pub struct ToolReport {
    /// How many records the tool's primary collection holds
    pub item_count: u64,
    /// One line for traces and stream events
    pub summary: String,
    /// Data-quality caveats the final answer must surface
    pub caveats: Vec<String>,
    /// What the cleaning pipeline did on this call
    pub cleaning_steps: Vec<String>,
    /// Wall time spent inside the remote board API
    pub api_time_ms: u64,
    /// The JSON body handed to the model as the tool result
    pub payload: Value,
}

/// Trait for a single tool (deterministic execution)
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema for the tool's arguments, in the shape the chat
    /// completions API expects under `function.parameters`.
    fn parameters(&self) -> Value;
    async fn execute(&self, args: &Value) -> Result<ToolReport>;
}

/// Tool registry for looking up tools and advertising the catalog
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// The function-calling catalog advertised to the model
    pub fn catalog(&self) -> Vec<Value> {
        let mut entries: Vec<&Arc<dyn Tool>> = self.tools.values().collect();
        entries.sort_by_key(|t| t.name());
        entries
            .into_iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.parameters(),
                    }
                })
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn opt_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn required_str(args: &Value, key: &str) -> Result<String> {
    opt_str(args, key)
        .ok_or_else(|| AgentError::InvalidToolArgs(format!("missing required argument '{}'", key)))
}

fn string_param(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn filters_applied(pairs: &[(&str, &Option<String>)]) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        if let Some(v) = value {
            map.insert(key.to_string(), json!(v));
        }
    }
    Value::Object(map)
}

/// Fetched and cleaned deals board, with timing
struct DealsSnapshot {
    records: Vec<Deal>,
    caveats: Vec<String>,
    cleaning_steps: Vec<String>,
    api_time_ms: u64,
}

async fn fetch_deals(client: &BoardClient, config: &Config) -> Result<DealsSnapshot> {
    let (items, api_time_ms) = client.fetch_board(&config.deals_board_id).await?;
    let raw = parse_items_to_records(&items);
    let outcome = clean::clean_deals(&raw);
    Ok(DealsSnapshot {
        records: outcome.records,
        caveats: outcome.caveats,
        cleaning_steps: outcome.cleaning_steps,
        api_time_ms,
    })
}

struct WorkOrdersSnapshot {
    records: Vec<WorkOrder>,
    caveats: Vec<String>,
    cleaning_steps: Vec<String>,
    api_time_ms: u64,
}

async fn fetch_workorders(client: &BoardClient, config: &Config) -> Result<WorkOrdersSnapshot> {
    let (items, api_time_ms) = client.fetch_board(&config.workorders_board_id).await?;
    let raw = parse_items_to_records(&items);
    let outcome = clean::clean_workorders(&raw);
    Ok(WorkOrdersSnapshot {
        records: outcome.records,
        caveats: outcome.caveats,
        cleaning_steps: outcome.cleaning_steps,
        api_time_ms,
    })
}

fn deal_entry(deal: &Deal) -> Value {
    json!({
        "name": deal.name,
        "status": deal.status,
        "stage": deal.stage,
        "value": deal.value,
        "value_formatted": format_currency(deal.value),
        "sector": deal.sector,
        "owner": deal.owner,
        "probability": deal.closure_probability,
        "tentative_close": deal.tentative_close,
        "created": deal.created,
    })
}

fn workorder_entry(wo: &WorkOrder) -> Value {
    json!({
        "serial": wo.serial,
        "deal_name": wo.deal_name,
        "customer": wo.customer,
        "sector": wo.sector,
        "execution_status": wo.execution_status,
        "nature": wo.nature_of_work,
        "type_of_work": wo.type_of_work,
        "amount_excl": wo.amount_excl,
        "amount_excl_formatted": format_currency(wo.amount_excl),
        "billed": wo.billed_excl,
        "collected": wo.collected,
        "receivable": wo.receivable,
        "wo_status": wo.wo_status,
        "billing_status": wo.billing_status,
        "owner": wo.owner,
    })
}

//
// ================= query_deals_board =================
//

pub struct QueryDealsBoardTool {
    client: Arc<BoardClient>,
    config: Arc<Config>,
}

#[async_trait::async_trait]
impl Tool for QueryDealsBoardTool {
    fn name(&self) -> &'static str {
        "query_deals_board"
    }

    fn description(&self) -> &'static str {
        "Query the Deals board. Returns deal pipeline data including names, values, \
         stages, statuses, sectors, owners, dates, plus a win rate for the filtered set. \
         All filters are optional exact matches; date_from/date_to bound the Tentative \
         Close Date (ISO YYYY-MM-DD)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": string_param("Deal status: Won, Dead, Open, On Hold"),
                "sector": string_param("Sector/service, e.g. Renewables, Mining, Railways, Powerline, Construction, Others"),
                "stage": string_param("Deal stage, 'A. Lead Generated' through 'O. Not Relevant at all', or 'Project Completed'"),
                "owner": string_param("Owner code, OWNER_001 through OWNER_007"),
                "closure_probability": string_param("Closure probability: High, Medium, Low"),
                "date_from": string_param("Earliest tentative close date, YYYY-MM-DD"),
                "date_to": string_param("Latest tentative close date, YYYY-MM-DD"),
            },
            "required": [],
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolReport> {
        let started = Instant::now();

        let filters = DealFilters {
            status: opt_str(args, "status"),
            sector: opt_str(args, "sector"),
            stage: opt_str(args, "stage"),
            owner: opt_str(args, "owner"),
            closure_probability: opt_str(args, "closure_probability"),
            date_from: opt_str(args, "date_from"),
            date_to: opt_str(args, "date_to"),
        };

        let snapshot = fetch_deals(&self.client, &self.config).await?;
        let filtered = filters.apply(&snapshot.records);

        let (total_value, valued_count) = sum_values(filtered.iter().map(|d| d.value));
        let status_breakdown = breakdown(&filtered, |d: &&Deal| d.status.as_deref());
        let stage_breakdown = breakdown(&filtered, |d: &&Deal| d.stage.as_deref());
        let sector_breakdown = breakdown(&filtered, |d: &&Deal| d.sector.as_deref());

        let won = status_breakdown.get("Won").copied().unwrap_or(0);
        let dead = status_breakdown.get("Dead").copied().unwrap_or(0);
        let win_rate = metrics::win_rate(won, dead);
        let win_rate_note = match win_rate {
            Some(rate) => format!(
                "Won={}, Dead={}, Win Rate = {}/{} = {}%",
                won,
                dead,
                won,
                won + dead,
                rate
            ),
            None => "No decided deals in this set".to_string(),
        };

        let payload = json!({
            "total_deals": filtered.len(),
            "IMPORTANT_win_rate": win_rate_note,
            "win_rate_pct": win_rate,
            "won_count": won,
            "dead_count": dead,
            "total_value": total_value,
            "total_value_formatted": format_currency(Some(total_value)),
            "valued_deals_count": valued_count,
            "status_breakdown": status_breakdown,
            "stage_breakdown": stage_breakdown,
            "sector_breakdown": sector_breakdown,
            "deals": filtered.iter().map(|d| deal_entry(d)).collect::<Vec<_>>(),
            "caveats": snapshot.caveats,
            "cleaning_steps": snapshot.cleaning_steps,
            "api_time_ms": snapshot.api_time_ms,
            "total_time_ms": started.elapsed().as_millis() as u64,
            "filters_applied": filters_applied(&[
                ("status", &filters.status),
                ("sector", &filters.sector),
                ("stage", &filters.stage),
                ("owner", &filters.owner),
                ("closure_probability", &filters.closure_probability),
                ("date_from", &filters.date_from),
                ("date_to", &filters.date_to),
            ]),
        });

        Ok(ToolReport {
            item_count: filtered.len() as u64,
            summary: format!("{} deals matched", filtered.len()),
            caveats: snapshot.caveats,
            cleaning_steps: snapshot.cleaning_steps,
            api_time_ms: snapshot.api_time_ms,
            payload,
        })
    }
}

//
// ================= query_workorders_board =================
//

pub struct QueryWorkOrdersBoardTool {
    client: Arc<BoardClient>,
    config: Arc<Config>,
}

#[async_trait::async_trait]
impl Tool for QueryWorkOrdersBoardTool {
    fn name(&self) -> &'static str {
        "query_workorders_board"
    }

    fn description(&self) -> &'static str {
        "Query the Work Orders board. Returns execution, billing, and collection data \
         with financial aggregates for the filtered set. All filters are optional exact \
         matches."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "execution_status": string_param("Execution status: Completed, Ongoing, Not Started, Pause/struck, Partial Completed, Executed until current month, Details pending"),
                "sector": string_param("Sector: Mining, Renewables, Railways, Powerline, Construction, Others"),
                "nature_of_work": string_param("Nature of work: One time Project, POC, Annual Rate Contract, Monthly Contract"),
                "billing_status": string_param("Billing status: Billed, Partially Billed, Not Billable, Update Required, Stuck"),
                "wo_status": string_param("Work order status: Closed, Open"),
                "deal_name": string_param("Specific deal name to look up"),
                "owner": string_param("BD/KAM personnel code, OWNER_001 through OWNER_007"),
            },
            "required": [],
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolReport> {
        let started = Instant::now();

        let filters = WorkOrderFilters {
            execution_status: opt_str(args, "execution_status"),
            sector: opt_str(args, "sector"),
            nature_of_work: opt_str(args, "nature_of_work"),
            billing_status: opt_str(args, "billing_status"),
            wo_status: opt_str(args, "wo_status"),
            deal_name: opt_str(args, "deal_name"),
            owner: opt_str(args, "owner"),
        };

        let snapshot = fetch_workorders(&self.client, &self.config).await?;
        let filtered = filters.apply(&snapshot.records);

        let (total_amount, _) = sum_values(filtered.iter().map(|w| w.amount_excl));
        let (total_billed, _) = sum_values(filtered.iter().map(|w| w.billed_excl));
        let (total_collected, _) = sum_values(filtered.iter().map(|w| w.collected));
        let (total_receivable, _) = sum_values(filtered.iter().map(|w| w.receivable));
        let (total_to_bill, _) = sum_values(filtered.iter().map(|w| w.to_bill_excl));

        let execution_breakdown =
            breakdown(&filtered, |w: &&WorkOrder| w.execution_status.as_deref());
        let sector_breakdown = breakdown(&filtered, |w: &&WorkOrder| w.sector.as_deref());

        let payload = json!({
            "total_work_orders": filtered.len(),
            "financials": {
                "total_amount": total_amount,
                "total_amount_formatted": format_currency(Some(total_amount)),
                "total_billed": total_billed,
                "total_billed_formatted": format_currency(Some(total_billed)),
                "total_collected": total_collected,
                "total_collected_formatted": format_currency(Some(total_collected)),
                "total_receivable": total_receivable,
                "total_receivable_formatted": format_currency(Some(total_receivable)),
                "total_to_bill": total_to_bill,
                "total_to_bill_formatted": format_currency(Some(total_to_bill)),
            },
            "execution_breakdown": execution_breakdown,
            "sector_breakdown": sector_breakdown,
            "work_orders": filtered.iter().map(|w| workorder_entry(w)).collect::<Vec<_>>(),
            "caveats": snapshot.caveats,
            "cleaning_steps": snapshot.cleaning_steps,
            "api_time_ms": snapshot.api_time_ms,
            "total_time_ms": started.elapsed().as_millis() as u64,
            "filters_applied": filters_applied(&[
                ("execution_status", &filters.execution_status),
                ("sector", &filters.sector),
                ("nature_of_work", &filters.nature_of_work),
                ("billing_status", &filters.billing_status),
                ("wo_status", &filters.wo_status),
                ("deal_name", &filters.deal_name),
                ("owner", &filters.owner),
            ]),
        });

        Ok(ToolReport {
            item_count: filtered.len() as u64,
            summary: format!("{} work orders matched", filtered.len()),
            caveats: snapshot.caveats,
            cleaning_steps: snapshot.cleaning_steps,
            api_time_ms: snapshot.api_time_ms,
            payload,
        })
    }
}

//
// ================= cross_board_analysis =================
//

pub struct CrossBoardAnalysisTool {
    client: Arc<BoardClient>,
    config: Arc<Config>,
}

#[async_trait::async_trait]
impl Tool for CrossBoardAnalysisTool {
    fn name(&self) -> &'static str {
        "cross_board_analysis"
    }

    fn description(&self) -> &'static str {
        "Join Deals and Work Orders by deal name to analyze the full lifecycle: \
         pipeline, execution, billing, collection. Use when the question involves BOTH \
         pipeline AND execution or billing data, such as end-to-end sector performance \
         or revenue realization."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sector": string_param("Sector: Mining, Renewables, Railways, Powerline, Construction, Others"),
                "owner": string_param("Owner code, OWNER_001 through OWNER_007"),
                "deal_name": string_param("Specific deal name for a detailed lifecycle view"),
            },
            "required": [],
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolReport> {
        let started = Instant::now();

        let sector = opt_str(args, "sector");
        let owner = opt_str(args, "owner");
        let deal_name = opt_str(args, "deal_name");

        // Both boards fetched concurrently
        let (deals_result, wo_result) = tokio::join!(
            fetch_deals(&self.client, &self.config),
            fetch_workorders(&self.client, &self.config),
        );
        let deals = deals_result?;
        let workorders = wo_result?;

        let deal_filters = DealFilters {
            sector: sector.clone(),
            owner: owner.clone(),
            ..Default::default()
        };
        let wo_filters = WorkOrderFilters {
            sector: sector.clone(),
            owner: owner.clone(),
            deal_name: deal_name.clone(),
            ..Default::default()
        };

        let mut filtered_deals = deal_filters.apply(&deals.records);
        if let Some(name) = deal_name.as_deref() {
            filtered_deals.retain(|d| d.name == name);
        }
        let filtered_wos = wo_filters.apply(&workorders.records);

        let join = lifecycle_join(&filtered_deals, &filtered_wos);

        let (pipeline_value, _) = sum_values(filtered_deals.iter().map(|d| d.value));
        let status_breakdown = breakdown(&filtered_deals, |d: &&Deal| d.status.as_deref());
        let (wo_value, _) = sum_values(filtered_wos.iter().map(|w| w.amount_excl));
        let (wo_billed, _) = sum_values(filtered_wos.iter().map(|w| w.billed_excl));
        let (wo_collected, _) = sum_values(filtered_wos.iter().map(|w| w.collected));
        let execution_breakdown =
            breakdown(&filtered_wos, |w: &&WorkOrder| w.execution_status.as_deref());

        let mut caveats = deals.caveats;
        caveats.extend(workorders.caveats);
        let mut cleaning_steps = deals.cleaning_steps;
        cleaning_steps.extend(workorders.cleaning_steps);
        let api_time_ms = deals.api_time_ms + workorders.api_time_ms;

        let payload = json!({
            "common_deal_count": join.common_deal_count,
            "deals_only_count": join.deals_only_count,
            "wo_only_count": join.wo_only_count,
            "deals_summary": {
                "total_deals": filtered_deals.len(),
                "status_breakdown": status_breakdown,
                "total_pipeline_value": pipeline_value,
            },
            "wo_summary": {
                "total_work_orders": filtered_wos.len(),
                "execution_breakdown": execution_breakdown,
                "total_wo_value": wo_value,
                "total_billed": wo_billed,
                "total_collected": wo_collected,
            },
            "lifecycle": join.lifecycle,
            "caveats": caveats,
            "cleaning_steps": cleaning_steps,
            "api_time_ms": api_time_ms,
            "total_time_ms": started.elapsed().as_millis() as u64,
            "filters_applied": filters_applied(&[
                ("sector", &sector),
                ("owner", &owner),
                ("deal_name", &deal_name),
            ]),
        });

        Ok(ToolReport {
            item_count: join.common_deal_count as u64,
            summary: format!(
                "{} deals joined across boards ({} deals-only, {} WO-only)",
                join.common_deal_count, join.deals_only_count, join.wo_only_count
            ),
            caveats,
            cleaning_steps,
            api_time_ms,
            payload,
        })
    }
}

//
// ================= aggregate_metrics =================
//

pub struct AggregateMetricsTool {
    client: Arc<BoardClient>,
    config: Arc<Config>,
}

impl AggregateMetricsTool {
    fn deals_group_key<'a>(group: &str, deal: &'a Deal) -> Option<&'a str> {
        match group {
            "sector" => deal.sector.as_deref(),
            "owner" => deal.owner.as_deref(),
            "stage" => deal.stage.as_deref(),
            "status" => deal.status.as_deref(),
            _ => None,
        }
    }

    fn wo_group_key<'a>(group: &str, wo: &'a WorkOrder) -> Option<&'a str> {
        match group {
            "sector" => wo.sector.as_deref(),
            "owner" => wo.owner.as_deref(),
            "execution_status" => wo.execution_status.as_deref(),
            "nature_of_work" => wo.nature_of_work.as_deref(),
            _ => None,
        }
    }

    fn deals_results(metric: &str, group: &str, deals: &[Deal]) -> Value {
        let groups = group_by(deals, |d| Self::deals_group_key(group, d));
        let mut out = Map::new();

        for (key, members) in &groups {
            let entry = match metric {
                "count" => json!(members.len()),
                "sum_value" => {
                    let (total, valued) = sum_values(members.iter().map(|d| d.value));
                    json!({
                        "total": total,
                        "total_formatted": format_currency(Some(total)),
                        "valued_count": valued,
                        "total_count": members.len(),
                    })
                }
                "avg_value" => {
                    let (total, valued) = sum_values(members.iter().map(|d| d.value));
                    if valued == 0 {
                        continue;
                    }
                    let avg = total / valued as f64;
                    json!({
                        "average": avg,
                        "average_formatted": format_currency(Some(avg)),
                        "count": valued,
                    })
                }
                "win_rate" => {
                    let count_status = |status: &str| {
                        members
                            .iter()
                            .filter(|d| d.status.as_deref() == Some(status))
                            .count() as u64
                    };
                    let won = count_status("Won");
                    let dead = count_status("Dead");
                    let rate = metrics::win_rate(won, dead);
                    let note = match rate {
                        Some(r) => {
                            format!("Win Rate for {}: {}/{} = {}%", key, won, won + dead, r)
                        }
                        None => format!("Win Rate for {}: no decided deals", key),
                    };
                    json!({
                        "IMPORTANT_calculation": note,
                        "win_rate_pct": rate,
                        "won": won,
                        "dead": dead,
                        "total_decided": won + dead,
                        "open": count_status("Open"),
                        "on_hold": count_status("On Hold"),
                    })
                }
                _ => continue,
            };
            out.insert(key.clone(), entry);
        }

        Value::Object(out)
    }

    fn wo_results(metric: &str, group: &str, wos: &[WorkOrder]) -> Value {
        let groups = group_by(wos, |w| Self::wo_group_key(group, w));
        let mut out = Map::new();

        for (key, members) in &groups {
            let entry = match metric {
                "count" => json!(members.len()),
                "sum_value" => {
                    let (total, _) = sum_values(members.iter().map(|w| w.amount_excl));
                    json!({
                        "total": total,
                        "total_formatted": format_currency(Some(total)),
                        "count": members.len(),
                    })
                }
                "collection_rate" => {
                    let (billed, _) = sum_values(members.iter().map(|w| w.billed_excl));
                    let (collected, _) = sum_values(members.iter().map(|w| w.collected));
                    json!({
                        "collection_rate_pct": metrics::collection_rate(collected, billed),
                        "total_billed": billed,
                        "total_billed_formatted": format_currency(Some(billed)),
                        "total_collected": collected,
                        "total_collected_formatted": format_currency(Some(collected)),
                        "count": members.len(),
                    })
                }
                _ => continue,
            };
            out.insert(key.clone(), entry);
        }

        Value::Object(out)
    }
}

#[async_trait::async_trait]
impl Tool for AggregateMetricsTool {
    fn name(&self) -> &'static str {
        "aggregate_metrics"
    }

    fn description(&self) -> &'static str {
        "Calculate aggregate metrics grouped by a dimension. Examples: total pipeline \
         value by sector (board=deals, metric=sum_value, group_by=sector); win rate by \
         owner (board=deals, metric=win_rate, group_by=owner); collection rate by sector \
         (board=workorders, metric=collection_rate, group_by=sector)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "board": {
                    "type": "string",
                    "enum": ["deals", "workorders", "both"],
                    "description": "Which board to aggregate over",
                },
                "metric": {
                    "type": "string",
                    "enum": ["sum_value", "count", "avg_value", "win_rate", "collection_rate"],
                    "description": "What to calculate",
                },
                "group_by": {
                    "type": "string",
                    "enum": ["sector", "owner", "stage", "status", "execution_status", "nature_of_work"],
                    "description": "Dimension to group by",
                },
            },
            "required": ["board", "metric", "group_by"],
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolReport> {
        let started = Instant::now();

        let board = required_str(args, "board")?;
        let metric = required_str(args, "metric")?;
        let group = required_str(args, "group_by")?;

        if !matches!(board.as_str(), "deals" | "workorders" | "both") {
            return Err(AgentError::InvalidToolArgs(format!(
                "unknown board '{}', expected deals, workorders, or both",
                board
            )));
        }

        let mut results = Map::new();
        let mut caveats = Vec::new();
        let mut cleaning_steps = Vec::new();
        let mut api_time_ms = 0;
        let mut item_count = 0u64;

        if board == "deals" || board == "both" {
            let snapshot = fetch_deals(&self.client, &self.config).await?;
            caveats.extend(snapshot.caveats);
            cleaning_steps.extend(snapshot.cleaning_steps);
            api_time_ms += snapshot.api_time_ms;
            item_count += snapshot.records.len() as u64;
            results.insert(
                "deals".to_string(),
                Self::deals_results(&metric, &group, &snapshot.records),
            );
        }

        if board == "workorders" || board == "both" {
            let snapshot = fetch_workorders(&self.client, &self.config).await?;
            caveats.extend(snapshot.caveats);
            cleaning_steps.extend(snapshot.cleaning_steps);
            api_time_ms += snapshot.api_time_ms;
            item_count += snapshot.records.len() as u64;
            results.insert(
                "workorders".to_string(),
                Self::wo_results(&metric, &group, &snapshot.records),
            );
        }

        let payload = json!({
            "board": board,
            "metric": metric,
            "group_by": group,
            "results": Value::Object(results),
            "caveats": caveats,
            "cleaning_steps": cleaning_steps,
            "api_time_ms": api_time_ms,
            "total_time_ms": started.elapsed().as_millis() as u64,
        });

        Ok(ToolReport {
            item_count,
            summary: format!("{} by {} over {} board(s)", metric, group, board),
            caveats,
            cleaning_steps,
            api_time_ms,
            payload,
        })
    }
}

//
// ================= get_data_summary =================
//

pub struct GetDataSummaryTool {
    client: Arc<BoardClient>,
    config: Arc<Config>,
}

#[async_trait::async_trait]
impl Tool for GetDataSummaryTool {
    fn name(&self) -> &'static str {
        "get_data_summary"
    }

    fn description(&self) -> &'static str {
        "Get a high-level summary of the boards: counts, value distributions, status \
         breakdowns, win rate, and collection health. Use for broad questions like \
         'how is the business doing?' or 'give me a summary'."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "board": {
                    "type": "string",
                    "enum": ["deals", "workorders", "both"],
                    "description": "Which board(s) to summarize, defaults to both",
                },
            },
            "required": [],
        })
    }

    async fn execute(&self, args: &Value) -> Result<ToolReport> {
        let started = Instant::now();

        let board = opt_str(args, "board").unwrap_or_else(|| "both".to_string());
        if !matches!(board.as_str(), "deals" | "workorders" | "both") {
            return Err(AgentError::InvalidToolArgs(format!(
                "unknown board '{}', expected deals, workorders, or both",
                board
            )));
        }

        let mut summary = Map::new();
        let mut caveats = Vec::new();
        let mut cleaning_steps = Vec::new();
        let mut api_time_ms = 0;
        let mut item_count = 0u64;

        if board == "deals" || board == "both" {
            let snapshot = fetch_deals(&self.client, &self.config).await?;
            caveats.extend(snapshot.caveats);
            cleaning_steps.extend(snapshot.cleaning_steps);
            api_time_ms += snapshot.api_time_ms;
            item_count += snapshot.records.len() as u64;

            let deals = &snapshot.records;
            let status_counts = breakdown(deals, |d: &Deal| d.status.as_deref());
            let sector_counts = breakdown(deals, |d: &Deal| d.sector.as_deref());
            let stage_counts = breakdown(deals, |d: &Deal| d.stage.as_deref());
            let owner_counts = breakdown(deals, |d: &Deal| d.owner.as_deref());

            let (total_value, valued) = sum_values(deals.iter().map(|d| d.value));
            let avg_value = if valued > 0 {
                total_value / valued as f64
            } else {
                0.0
            };

            let won = status_counts.get("Won").copied().unwrap_or(0);
            let dead = status_counts.get("Dead").copied().unwrap_or(0);
            let win_rate = metrics::win_rate(won, dead);
            let win_rate_note = match win_rate {
                Some(rate) => format!(
                    "Won={}, Dead={}, Total Decided={}, Win Rate = {}/{} = {}% (this is NOT 100%)",
                    won,
                    dead,
                    won + dead,
                    won,
                    won + dead,
                    rate
                ),
                None => "No decided deals".to_string(),
            };

            let open_deals: Vec<&Deal> = deals
                .iter()
                .filter(|d| d.status.as_deref() == Some("Open"))
                .collect();
            let (open_value, _) = sum_values(open_deals.iter().map(|d| d.value));

            summary.insert(
                "deals".to_string(),
                json!({
                    "IMPORTANT_win_rate_calculation": win_rate_note,
                    "total_count": deals.len(),
                    "status_breakdown": status_counts,
                    "sector_breakdown": sector_counts,
                    "stage_breakdown": stage_counts,
                    "total_value": total_value,
                    "total_value_formatted": format_currency(Some(total_value)),
                    "average_deal_value": avg_value,
                    "average_deal_value_formatted": format_currency(Some(avg_value)),
                    "valued_deals": valued,
                    "win_rate_pct": win_rate,
                    "won_count": won,
                    "dead_count": dead,
                    "open_pipeline": {
                        "count": open_deals.len(),
                        "value": open_value,
                        "value_formatted": format_currency(Some(open_value)),
                    },
                    "owner_counts": owner_counts,
                }),
            );
        }

        if board == "workorders" || board == "both" {
            let snapshot = fetch_workorders(&self.client, &self.config).await?;
            caveats.extend(snapshot.caveats);
            cleaning_steps.extend(snapshot.cleaning_steps);
            api_time_ms += snapshot.api_time_ms;
            item_count += snapshot.records.len() as u64;

            let wos = &snapshot.records;
            let exec_counts = breakdown(wos, |w: &WorkOrder| w.execution_status.as_deref());
            let sector_counts = breakdown(wos, |w: &WorkOrder| w.sector.as_deref());

            let (total_amount, _) = sum_values(wos.iter().map(|w| w.amount_excl));
            let (total_billed, _) = sum_values(wos.iter().map(|w| w.billed_excl));
            let (total_collected, _) = sum_values(wos.iter().map(|w| w.collected));
            let (total_receivable, _) = sum_values(wos.iter().map(|w| w.receivable));

            let billing_rate = if total_amount > 0.0 {
                Some(metrics::round1(total_billed / total_amount * 100.0))
            } else {
                None
            };

            summary.insert(
                "workorders".to_string(),
                json!({
                    "total_count": wos.len(),
                    "execution_breakdown": exec_counts,
                    "sector_breakdown": sector_counts,
                    "financials": {
                        "total_amount": total_amount,
                        "total_amount_formatted": format_currency(Some(total_amount)),
                        "total_billed": total_billed,
                        "total_billed_formatted": format_currency(Some(total_billed)),
                        "total_collected": total_collected,
                        "total_collected_formatted": format_currency(Some(total_collected)),
                        "total_receivable": total_receivable,
                        "total_receivable_formatted": format_currency(Some(total_receivable)),
                        "billing_rate_pct": billing_rate,
                        "collection_rate_pct": metrics::collection_rate(total_collected, total_billed),
                    },
                }),
            );
        }

        let payload = json!({
            "summary": Value::Object(summary),
            "caveats": caveats,
            "cleaning_steps": cleaning_steps,
            "api_time_ms": api_time_ms,
            "total_time_ms": started.elapsed().as_millis() as u64,
        });

        Ok(ToolReport {
            item_count,
            summary: format!("summarized {} board(s), {} records", board, item_count),
            caveats,
            cleaning_steps,
            api_time_ms,
            payload,
        })
    }
}

/// Create the default registry over the two boards
pub fn create_default_registry(client: Arc<BoardClient>, config: Arc<Config>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(QueryDealsBoardTool {
        client: client.clone(),
        config: config.clone(),
    }));
    registry.register(Arc::new(QueryWorkOrdersBoardTool {
        client: client.clone(),
        config: config.clone(),
    }));
    registry.register(Arc::new(CrossBoardAnalysisTool {
        client: client.clone(),
        config: config.clone(),
    }));
    registry.register(Arc::new(AggregateMetricsTool {
        client: client.clone(),
        config: config.clone(),
    }));
    registry.register(Arc::new(GetDataSummaryTool { client, config }));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal(name: &str, status: Option<&str>, sector: Option<&str>, value: Option<f64>) -> Deal {
        Deal {
            item_id: name.to_string(),
            name: name.to_string(),
            status: status.map(|s| s.to_string()),
            stage: None,
            sector: sector.map(|s| s.to_string()),
            owner: None,
            closure_probability: None,
            value,
            close_date: None,
            tentative_close: None,
            created: None,
        }
    }

    #[test]
    fn win_rate_results_exclude_open_from_denominator() {
        let deals = vec![
            deal("A", Some("Won"), Some("Mining"), None),
            deal("B", Some("Dead"), Some("Mining"), None),
            deal("C", Some("Open"), Some("Mining"), None),
            deal("D", Some("Won"), Some("Mining"), None),
        ];
        let results = AggregateMetricsTool::deals_results("win_rate", "sector", &deals);
        let mining = &results["Mining"];
        assert_eq!(mining["win_rate_pct"], json!(66.7));
        assert_eq!(mining["total_decided"], json!(3));
        assert_eq!(mining["open"], json!(1));
    }

    #[test]
    fn avg_value_skips_groups_with_no_valued_deals() {
        let deals = vec![
            deal("A", None, Some("Mining"), Some(100.0)),
            deal("B", None, Some("Mining"), Some(300.0)),
            deal("C", None, Some("Railways"), None),
        ];
        let results = AggregateMetricsTool::deals_results("avg_value", "sector", &deals);
        assert_eq!(results["Mining"]["average"], json!(200.0));
        assert!(results.get("Railways").is_none());
    }

    #[test]
    fn catalog_lists_all_five_tools() {
        let config = Arc::new(Config {
            board_api_url: "http://localhost".to_string(),
            board_api_key: "test".to_string(),
            deals_board_id: "1".to_string(),
            workorders_board_id: "2".to_string(),
            llm_api_key: "test".to_string(),
            llm_base_url: "http://localhost".to_string(),
            llm_model: "test".to_string(),
            port: 8000,
        });
        let client = Arc::new(BoardClient::new(
            config.board_api_url.clone(),
            config.board_api_key.clone(),
        ));

        let registry = create_default_registry(client, config);
        let catalog = registry.catalog();

        assert_eq!(catalog.len(), 5);
        let names: Vec<&str> = catalog
            .iter()
            .filter_map(|t| t["function"]["name"].as_str())
            .collect();
        assert!(names.contains(&"query_deals_board"));
        assert!(names.contains(&"cross_board_analysis"));
        assert!(names.contains(&"get_data_summary"));
        // catalog order is deterministic
        assert_eq!(names[0], "aggregate_metrics");
    }
}
