//! Chat-completions client for the reasoning step
//!
//! Talks to any OpenAI-compatible endpoint. The orchestrator only sees
//! the [`Reasoner`] trait, so tests swap in a scripted implementation
//! instead of a live model.

use crate::error::AgentError;
use crate::models::{ChatMessage, MessageRole, ToolCall};
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info};

/// System prompt for the business-intelligence agent
pub const SYSTEM_PROMPT: &str = r#"You are a Business Intelligence Agent for a company that manages its deals pipeline and work orders on two boards.

## Your Role
You help founders and executives get quick, accurate answers to business questions by querying LIVE board data.

## Available Data Sources
1. **Deals Board**: deals with pipeline stages, deal values, sectors, owners, statuses, and closure probabilities.
2. **Work Orders Board**: work orders tracking execution, billing, and collections for won deals.

## Key Data Relationships
- Deal names link both boards
- Owner codes (OWNER_001 to OWNER_007) are shared across boards
- Sectors (Mining, Renewables, Railways, Powerline, Construction, Others) are shared
- Client codes use DIFFERENT namespaces on the two boards. Do NOT join on client codes

## Sector Mappings
When users say:
- "energy sector" -> query both Renewables AND Powerline
- "infrastructure" -> query Railways AND Construction
- "all sectors" -> include all available sectors

## Response Guidelines
1. ALWAYS use tools to query live data. Never guess or make up numbers
2. ALWAYS report numbers EXACTLY as returned by the tools. Do NOT recalculate percentages
3. When a tool returns win_rate_pct, collection_rate_pct, or any calculated metric, use that EXACT number
4. ALWAYS mention data quality caveats when null rates are significant (>20%)
5. Format currency values in Indian format with the ₹ symbol (Lakhs and Crores)
6. Provide actionable insights, not just raw numbers
7. Use markdown tables for comparisons
8. If a question is ambiguous, ask a clarifying question
9. Support follow-up questions using conversation context

## CRITICAL: Accuracy Rules
- Win Rate = Won / (Won + Dead) x 100. Example: 165 Won and 127 Dead = 165/292 = 56.5%, NOT 100%
- NEVER say 100% win rate unless Dead = 0
- Collection Rate = Collected Amount / Billed Value
- Always double-check your arithmetic against the tool output before responding

## Important Data Notes
- Many deals have no monetary value assigned. Always caveat totals
- Most deals have no actual close date. Use Tentative Close Date instead
- The boards contain duplicate header rows and a known "BIlled" typo, both fixed automatically before you see the data"#;

/// One reasoning step: either a final answer or tool requests
#[derive(Debug, Clone)]
pub enum ReasonerReply {
    Answer(String),
    ToolCalls(Vec<ToolCall>),
}

#[async_trait::async_trait]
pub trait Reasoner: Send + Sync {
    async fn respond(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ReasonerReply>;
}

/// Reusable chat-completions client (connection-pooled)
pub struct OpenAiReasoner {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiReasoner {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: m.role,
                content: if m.content.is_empty() && !m.tool_calls.is_empty() {
                    None
                } else {
                    Some(m.content.clone())
                },
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| WireToolCall {
                                id: tc.id.clone(),
                                call_type: "function".to_string(),
                                function: WireFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.to_string(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Reasoner for OpenAiReasoner {
    async fn respond(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ReasonerReply> {
        if self.api_key.is_empty() {
            return Err(AgentError::Llm("LLM API key not configured".to_string()));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: Self::wire_messages(messages),
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.to_vec())
            },
            temperature: 0.1,
        };

        info!(model = %self.model, messages = messages.len(), "calling chat completions");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("chat completions request failed: {}", e);
                AgentError::Llm(format!("request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "chat completions error response: {}", body);
            return Err(AgentError::Llm(format!("{}: {}", status, body)));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Llm(format!("parse error: {}", e)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Llm("no choices in completion".to_string()))?;

        if let Some(wire_calls) = choice.message.tool_calls {
            if !wire_calls.is_empty() {
                let mut calls = Vec::with_capacity(wire_calls.len());
                for wc in wire_calls {
                    let arguments: Value =
                        serde_json::from_str(&wc.function.arguments).unwrap_or_else(|_| json!({}));
                    calls.push(ToolCall {
                        id: wc.id,
                        name: wc.function.name,
                        arguments,
                    });
                }
                return Ok(ReasonerReply::ToolCalls(calls));
            }
        }

        Ok(ReasonerReply::Answer(
            choice.message.content.unwrap_or_default(),
        ))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

/// Scripted reasoner for tests and offline demos. Pops replies in
/// order; once exhausted it answers with a fixed closing line.
pub struct ScriptedReasoner {
    replies: Mutex<VecDeque<ReasonerReply>>,
}

impl ScriptedReasoner {
    pub fn new(replies: Vec<ReasonerReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }
}

#[async_trait::async_trait]
impl Reasoner for ScriptedReasoner {
    async fn respond(&self, _messages: &[ChatMessage], _tools: &[Value]) -> Result<ReasonerReply> {
        let mut replies = self
            .replies
            .lock()
            .map_err(|_| AgentError::Llm("scripted reasoner poisoned".to_string()))?;
        Ok(replies
            .pop_front()
            .unwrap_or_else(|| ReasonerReply::Answer("No further steps.".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_messages_omit_empty_fields() {
        let messages = vec![
            ChatMessage::system("be helpful"),
            ChatMessage::assistant_tool_calls(vec![ToolCall {
                id: "call_1".to_string(),
                name: "get_data_summary".to_string(),
                arguments: json!({"board": "both"}),
            }]),
            ChatMessage::tool_result("call_1", "{\"summary\":{}}"),
        ];

        let wire = OpenAiReasoner::wire_messages(&messages);
        let encoded = serde_json::to_value(&wire).expect("serializes");

        // plain message carries no tool fields
        assert!(encoded[0].get("tool_calls").is_none());
        assert!(encoded[0].get("tool_call_id").is_none());

        // assistant tool request has stringified arguments
        assert_eq!(encoded[1]["tool_calls"][0]["type"], json!("function"));
        assert_eq!(
            encoded[1]["tool_calls"][0]["function"]["arguments"],
            json!("{\"board\":\"both\"}")
        );

        // tool result links back to the call id
        assert_eq!(encoded[2]["role"], json!("tool"));
        assert_eq!(encoded[2]["tool_call_id"], json!("call_1"));
    }

    #[tokio::test]
    async fn scripted_reasoner_pops_in_order() {
        let reasoner = ScriptedReasoner::new(vec![
            ReasonerReply::ToolCalls(vec![ToolCall {
                id: "c1".to_string(),
                name: "query_deals_board".to_string(),
                arguments: json!({}),
            }]),
            ReasonerReply::Answer("done".to_string()),
        ]);

        let first = reasoner.respond(&[], &[]).await.expect("reply");
        assert!(matches!(first, ReasonerReply::ToolCalls(_)));
        let second = reasoner.respond(&[], &[]).await.expect("reply");
        assert!(matches!(second, ReasonerReply::Answer(a) if a == "done"));
    }
}
