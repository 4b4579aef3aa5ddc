//! Agent orchestration loop
//!
//! Alternates reasoning and tool execution until the model produces a
//! final answer or the iteration cap fires. The loop owns message
//! assembly: tool results are threaded back in issue order, and only
//! the user question and the final answer survive into session history.

use crate::error::AgentError;
use crate::llm::{Reasoner, ReasonerReply, SYSTEM_PROMPT};
use crate::models::{AgentEvent, ChatMessage, MessageRole, ToolTrace};
use crate::tools::dispatch::Dispatcher;
use crate::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Hard cap on reasoning and tool iterations per turn
pub const MAX_TOOL_ITERATIONS: usize = 6;

const ITERATION_CAP_ANSWER: &str = "I could not complete the analysis within the allowed number \
     of tool steps. Please try a narrower question.";

/// Everything one turn produced
#[derive(Debug)]
pub struct TurnOutcome {
    pub response: String,
    pub traces: Vec<ToolTrace>,
    pub caveats: Vec<String>,
    /// The conversation to persist: prior history plus this turn's
    /// user question and final answer. Tool chatter is not kept.
    pub messages: Vec<ChatMessage>,
}

pub struct Orchestrator {
    reasoner: Box<dyn Reasoner>,
    dispatcher: Dispatcher,
}

impl Orchestrator {
    pub fn new(reasoner: Box<dyn Reasoner>, dispatcher: Dispatcher) -> Self {
        Self {
            reasoner,
            dispatcher,
        }
    }

    /// Run one conversational turn over the given history.
    ///
    /// `events` receives progress events for streaming clients; a
    /// closed receiver never fails the turn.
    pub async fn run_turn(
        &self,
        history: Vec<ChatMessage>,
        question: &str,
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<TurnOutcome> {
        let mut working = Vec::with_capacity(history.len() + 2);
        if !history
            .first()
            .is_some_and(|m| m.role == MessageRole::System)
        {
            working.push(ChatMessage::system(SYSTEM_PROMPT));
        }
        working.extend(history.iter().cloned());
        working.push(ChatMessage::user(question));

        let tools = self.dispatcher.registry().catalog();
        let mut traces = Vec::new();
        let mut caveats: Vec<String> = Vec::new();

        for iteration in 0..MAX_TOOL_ITERATIONS {
            let reply = self.reasoner.respond(&working, &tools).await?;

            match reply {
                ReasonerReply::Answer(answer) => {
                    info!(iteration, traces = traces.len(), "turn complete");
                    emit(
                        events,
                        AgentEvent::Token {
                            content: answer.clone(),
                        },
                    )
                    .await;
                    return Ok(finish(history, question, answer, traces, caveats));
                }
                ReasonerReply::ToolCalls(calls) => {
                    info!(iteration, calls = calls.len(), "model requested tools");
                    working.push(ChatMessage::assistant_tool_calls(calls.clone()));

                    // Results appended in issue order, one per call id
                    for call in calls {
                        emit(
                            events,
                            AgentEvent::ToolStart {
                                tool: call.name.clone(),
                                input: call.arguments.clone(),
                            },
                        )
                        .await;

                        let outcome = self.dispatcher.dispatch(&call.name, &call.arguments).await;

                        emit(
                            events,
                            AgentEvent::ToolEnd {
                                tool: call.name.clone(),
                                summary: outcome.trace.result_summary.clone(),
                                items: outcome.trace.items_returned,
                            },
                        )
                        .await;

                        for caveat in outcome.caveats {
                            if !caveats.contains(&caveat) {
                                caveats.push(caveat);
                            }
                        }
                        traces.push(outcome.trace);

                        let content = serde_json::to_string(&outcome.result_for_llm)?;
                        working.push(ChatMessage::tool_result(call.id, content));
                    }
                }
            }
        }

        warn!(
            max = MAX_TOOL_ITERATIONS,
            "iteration cap hit without a final answer"
        );
        emit(
            events,
            AgentEvent::Token {
                content: ITERATION_CAP_ANSWER.to_string(),
            },
        )
        .await;
        Ok(finish(
            history,
            question,
            ITERATION_CAP_ANSWER.to_string(),
            traces,
            caveats,
        ))
    }
}

fn finish(
    history: Vec<ChatMessage>,
    question: &str,
    response: String,
    traces: Vec<ToolTrace>,
    caveats: Vec<String>,
) -> TurnOutcome {
    let mut messages = history;
    messages.push(ChatMessage::user(question));
    messages.push(ChatMessage::assistant(response.clone()));

    TurnOutcome {
        response,
        traces,
        caveats,
        messages,
    }
}

async fn emit(events: Option<&mpsc::Sender<AgentEvent>>, event: AgentEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

impl From<AgentError> for AgentEvent {
    fn from(e: AgentError) -> Self {
        AgentEvent::Error {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedReasoner;
    use crate::models::ToolCall;
    use crate::tools::ToolRegistry;
    use serde_json::json;
    use std::sync::Arc;

    fn orchestrator(replies: Vec<ReasonerReply>) -> Orchestrator {
        Orchestrator::new(
            Box::new(ScriptedReasoner::new(replies)),
            Dispatcher::new(Arc::new(ToolRegistry::new())),
        )
    }

    /// Scripted reasoner that also keeps a copy of every transcript it
    /// was shown, so tests can inspect the tool-call/result pairing.
    struct RecordingReasoner {
        inner: ScriptedReasoner,
        seen: std::sync::Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait::async_trait]
    impl crate::llm::Reasoner for RecordingReasoner {
        async fn respond(
            &self,
            messages: &[ChatMessage],
            tools: &[serde_json::Value],
        ) -> Result<ReasonerReply> {
            self.seen
                .lock()
                .expect("seen lock")
                .push(messages.to_vec());
            self.inner.respond(messages, tools).await
        }
    }

    struct SharedReasoner(Arc<RecordingReasoner>);

    #[async_trait::async_trait]
    impl crate::llm::Reasoner for SharedReasoner {
        async fn respond(
            &self,
            messages: &[ChatMessage],
            tools: &[serde_json::Value],
        ) -> Result<ReasonerReply> {
            self.0.respond(messages, tools).await
        }
    }

    #[tokio::test]
    async fn answer_without_tools_keeps_history_clean() {
        let agent = orchestrator(vec![ReasonerReply::Answer("Hello there.".to_string())]);

        let outcome = agent
            .run_turn(Vec::new(), "hi", None)
            .await
            .expect("turn runs");

        assert_eq!(outcome.response, "Hello there.");
        assert!(outcome.traces.is_empty());
        // user question + assistant answer, no system prompt persisted
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[0].role, MessageRole::User);
        assert_eq!(outcome.messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn tool_failures_become_traces_not_turn_errors() {
        // Empty registry, so every requested tool is unknown
        let agent = orchestrator(vec![
            ReasonerReply::ToolCalls(vec![
                ToolCall {
                    id: "c1".to_string(),
                    name: "query_deals_board".to_string(),
                    arguments: json!({}),
                },
                ToolCall {
                    id: "c2".to_string(),
                    name: "get_data_summary".to_string(),
                    arguments: json!({}),
                },
            ]),
            ReasonerReply::Answer("Could not fetch data.".to_string()),
        ]);

        let outcome = agent
            .run_turn(Vec::new(), "how is the pipeline?", None)
            .await
            .expect("turn runs");

        assert_eq!(outcome.response, "Could not fetch data.");
        // both calls traced, in issue order
        assert_eq!(outcome.traces.len(), 2);
        assert_eq!(outcome.traces[0].tool_name, "query_deals_board");
        assert_eq!(outcome.traces[1].tool_name, "get_data_summary");
    }

    #[tokio::test]
    async fn tool_results_paired_to_call_ids_in_issue_order() {
        let reasoner = RecordingReasoner {
            inner: ScriptedReasoner::new(vec![
                ReasonerReply::ToolCalls(vec![
                    ToolCall {
                        id: "call-a".to_string(),
                        name: "query_deals_board".to_string(),
                        arguments: json!({"status": "Won"}),
                    },
                    ToolCall {
                        id: "call-b".to_string(),
                        name: "query_workorders_board".to_string(),
                        arguments: json!({}),
                    },
                ]),
                ReasonerReply::Answer("Pipeline looks healthy.".to_string()),
            ]),
            seen: std::sync::Mutex::new(Vec::new()),
        };
        let seen_handle = Arc::new(reasoner);
        let agent = Orchestrator::new(
            Box::new(SharedReasoner(seen_handle.clone())),
            Dispatcher::new(Arc::new(ToolRegistry::new())),
        );

        let outcome = agent
            .run_turn(Vec::new(), "compare boards", None)
            .await
            .expect("turn runs");
        assert_eq!(outcome.response, "Pipeline looks healthy.");

        let seen = seen_handle.seen.lock().expect("seen lock");
        assert_eq!(seen.len(), 2);

        // Second transcript: system, user, assistant tool calls, two results
        let second = &seen[1];
        assert_eq!(second.len(), 5);
        assert_eq!(second[2].role, MessageRole::Assistant);
        assert_eq!(second[2].tool_calls.len(), 2);
        assert_eq!(second[3].role, MessageRole::Tool);
        assert_eq!(second[3].tool_call_id.as_deref(), Some("call-a"));
        assert_eq!(second[4].tool_call_id.as_deref(), Some("call-b"));
    }

    #[tokio::test]
    async fn iteration_cap_fails_closed() {
        // The model keeps asking for tools and never answers
        let endless: Vec<ReasonerReply> = (0..MAX_TOOL_ITERATIONS + 2)
            .map(|i| {
                ReasonerReply::ToolCalls(vec![ToolCall {
                    id: format!("c{}", i),
                    name: "query_deals_board".to_string(),
                    arguments: json!({}),
                }])
            })
            .collect();
        let agent = orchestrator(endless);

        let outcome = agent
            .run_turn(Vec::new(), "loop forever", None)
            .await
            .expect("turn runs");

        assert!(outcome.response.contains("could not complete"));
        assert_eq!(outcome.traces.len(), MAX_TOOL_ITERATIONS);
    }

    #[tokio::test]
    async fn stream_events_arrive_in_order() {
        let agent = orchestrator(vec![
            ReasonerReply::ToolCalls(vec![ToolCall {
                id: "c1".to_string(),
                name: "unknown_tool".to_string(),
                arguments: json!({}),
            }]),
            ReasonerReply::Answer("done".to_string()),
        ]);

        let (tx, mut rx) = mpsc::channel(16);
        agent
            .run_turn(Vec::new(), "q", Some(&tx))
            .await
            .expect("turn runs");
        drop(tx);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(match event {
                AgentEvent::ToolStart { .. } => "start",
                AgentEvent::ToolEnd { .. } => "end",
                AgentEvent::Token { .. } => "token",
                _ => "other",
            });
        }
        assert_eq!(kinds, vec!["start", "end", "token"]);
    }
}
