//! HTTP client for the external record-management system
//!
//! Cursor-paginated item fetches over a text query protocol, with
//! retry/backoff and rate-limit handling. Uses a long-lived
//! reqwest::Client for connection pooling.

use crate::error::AgentError;
use crate::models::BoardStatus;
use crate::Result;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MAX_ATTEMPTS: u32 = 3;
const PAGE_LIMIT: usize = 500;
const DEFAULT_RATE_LIMIT_DELAY_SECS: u64 = 5;

/// One item as returned by the external system
#[derive(Debug, Clone, Deserialize)]
pub struct BoardItem {
    pub id: String,
    pub name: String,
    pub column_values: Vec<ColumnValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnValue {
    pub id: String,
    pub text: Option<String>,
    pub value: Option<String>,
    pub column: ColumnMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMeta {
    pub title: String,
}

/// Flat key → value view of one item.
///
/// Every declared column produces an entry, possibly `None` — no field
/// is ever silently dropped.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub item_id: String,
    pub name: String,
    pub fields: HashMap<String, Option<String>>,
}

impl RawRecord {
    pub fn field(&self, title: &str) -> Option<&str> {
        self.fields.get(title).and_then(|v| v.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ItemsPage {
    cursor: Option<String>,
    items: Vec<BoardItem>,
}

/// Client for the external board API
pub struct BoardClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl BoardClient {
    pub fn new(api_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_url,
            api_key,
        }
    }

    /// Execute one query against the external API with retry logic.
    ///
    /// Rate-limit responses sleep for the server-specified delay and
    /// retry within the same loop. Timeouts and 5xx responses back off
    /// exponentially. Other 4xx responses and structured error payloads
    /// fail immediately — the latter indicate a malformed request,
    /// not a transient condition.
    pub async fn execute_query(&self, query: &str, variables: Option<Value>) -> Result<Value> {
        let mut payload = json!({ "query": query });
        if let Some(vars) = variables {
            payload["variables"] = vars;
        }

        for attempt in 0..MAX_ATTEMPTS {
            let response = match self
                .client
                .post(&self.api_url)
                .header("Authorization", &self.api_key)
                .header("Content-Type", "application/json")
                .json(&payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    if attempt + 1 < MAX_ATTEMPTS {
                        let delay = Duration::from_secs(1 << attempt);
                        warn!(attempt, ?delay, "Board API timeout, backing off");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(AgentError::Transport(format!(
                        "timeout after {} attempts: {}",
                        MAX_ATTEMPTS, e
                    )));
                }
                Err(e) => return Err(AgentError::Transport(e.to_string())),
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_RATE_LIMIT_DELAY_SECS);
                warn!(retry_after, "Board API rate limited, sleeping");
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                continue;
            }

            if status.is_server_error() {
                if attempt + 1 < MAX_ATTEMPTS {
                    let delay = Duration::from_secs(1 << attempt);
                    warn!(status = %status, attempt, ?delay, "Board API server error, backing off");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(AgentError::Transport(format!(
                    "server error {} after {} attempts",
                    status, MAX_ATTEMPTS
                )));
            }

            if !status.is_success() {
                return Err(AgentError::Transport(format!(
                    "board API returned {}",
                    status
                )));
            }

            let body: Value = response.json().await?;

            // Structured error in a 200 body means the query itself was
            // malformed; retrying would just repeat the failure.
            if let Some(errors) = body.get("errors").and_then(Value::as_array) {
                let message = errors
                    .first()
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown query error");
                return Err(AgentError::RemoteQuery(message.to_string()));
            }

            return Ok(body);
        }

        // Only repeated 429s can fall through the retry loop
        Err(AgentError::RateLimited(DEFAULT_RATE_LIMIT_DELAY_SECS))
    }

    /// Fetch all items from a board with cursor-based pagination.
    ///
    /// Returns the items and the total API time in milliseconds.
    pub async fn fetch_board(&self, board_id: &str) -> Result<(Vec<BoardItem>, u64)> {
        let start = Instant::now();
        let mut all_items = Vec::new();

        let query = format!(
            r#"{{
                boards(ids: {board_id}) {{
                    name
                    items_page(limit: {PAGE_LIMIT}) {{
                        cursor
                        items {{
                            id
                            name
                            column_values {{ id text value column {{ title }} }}
                        }}
                    }}
                }}
            }}"#
        );

        let result = self.execute_query(&query, None).await?;
        let page_value = result
            .pointer("/data/boards/0/items_page")
            .cloned()
            .ok_or_else(|| {
                AgentError::MalformedResponse("missing items_page in board response".to_string())
            })?;
        let page: ItemsPage = serde_json::from_value(page_value)?;

        all_items.extend(page.items);
        let mut cursor = page.cursor;

        while let Some(c) = cursor {
            let next_query = format!(
                r#"{{
                    next_items_page(cursor: "{c}", limit: {PAGE_LIMIT}) {{
                        cursor
                        items {{
                            id
                            name
                            column_values {{ id text value column {{ title }} }}
                        }}
                    }}
                }}"#
            );

            let result = self.execute_query(&next_query, None).await?;
            let page_value = result.pointer("/data/next_items_page").cloned().ok_or_else(|| {
                AgentError::MalformedResponse("missing next_items_page in response".to_string())
            })?;
            let page: ItemsPage = serde_json::from_value(page_value)?;

            all_items.extend(page.items);
            cursor = page.cursor;
        }

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(board_id, items = all_items.len(), elapsed_ms = elapsed, "Board fetched");

        Ok((all_items, elapsed))
    }

    /// Verify connectivity to a board; used by the health endpoints.
    pub async fn check_connection(&self, board_id: &str) -> BoardStatus {
        let query = format!(
            r#"{{ boards(ids: {board_id}) {{ name items_count }} }}"#
        );

        match self.execute_query(&query, None).await {
            Ok(result) => {
                let board = result.pointer("/data/boards/0");
                BoardStatus {
                    board_name: board
                        .and_then(|b| b.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    connected: board.is_some(),
                    item_count: board
                        .and_then(|b| b.get("items_count"))
                        .and_then(Value::as_u64),
                    error: None,
                }
            }
            Err(e) => {
                info!(board_id, error = %e, "Board connection check failed");
                BoardStatus {
                    board_name: board_id.to_string(),
                    connected: false,
                    item_count: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Convert external item structures into flat records.
///
/// Prefers the pre-rendered text value; falls back to decoding the
/// structured value and extracting its display label.
pub fn parse_items_to_records(items: &[BoardItem]) -> Vec<RawRecord> {
    items
        .iter()
        .map(|item| {
            let mut fields = HashMap::with_capacity(item.column_values.len());

            for col in &item.column_values {
                let mut resolved = col.text.clone().filter(|t| !t.is_empty());

                if resolved.is_none() {
                    if let Some(raw) = &col.value {
                        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw) {
                            resolved = obj
                                .get("text")
                                .or_else(|| obj.get("label"))
                                .and_then(Value::as_str)
                                .map(|s| s.to_string());
                        }
                    }
                }

                fields.insert(col.column.title.clone(), resolved);
            }

            RawRecord {
                item_id: item.id.clone(),
                name: item.name.clone(),
                fields,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, cols: Vec<(&str, Option<&str>, Option<&str>)>) -> BoardItem {
        BoardItem {
            id: "1".to_string(),
            name: name.to_string(),
            column_values: cols
                .into_iter()
                .map(|(title, text, value)| ColumnValue {
                    id: title.to_lowercase().replace(' ', "_"),
                    text: text.map(|s| s.to_string()),
                    value: value.map(|s| s.to_string()),
                    column: ColumnMeta {
                        title: title.to_string(),
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn parse_prefers_text_value() {
        let items = vec![item(
            "Alpha",
            vec![("Deal Status", Some("Won"), Some(r#"{"label":"ignored"}"#))],
        )];
        let records = parse_items_to_records(&items);
        assert_eq!(records[0].field("Deal Status"), Some("Won"));
    }

    #[test]
    fn parse_falls_back_to_structured_label() {
        let items = vec![item(
            "Alpha",
            vec![("Deal Status", None, Some(r#"{"label":"Open"}"#))],
        )];
        let records = parse_items_to_records(&items);
        assert_eq!(records[0].field("Deal Status"), Some("Open"));
    }

    #[test]
    fn parse_keeps_null_fields() {
        let items = vec![item("Alpha", vec![("Masked Deal value", None, None)])];
        let records = parse_items_to_records(&items);
        assert!(records[0].fields.contains_key("Masked Deal value"));
        assert_eq!(records[0].field("Masked Deal value"), None);
    }

    #[test]
    fn parse_treats_undecodable_value_as_null() {
        let items = vec![item(
            "Alpha",
            vec![("Close Date (A)", None, Some("not json"))],
        )];
        let records = parse_items_to_records(&items);
        assert_eq!(records[0].field("Close Date (A)"), None);
    }
}
