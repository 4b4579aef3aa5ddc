use board_bi_agent::{
    agent::Orchestrator,
    llm::{ReasonerReply, ScriptedReasoner},
    models::ToolCall,
    tools::{dispatch::Dispatcher, ToolRegistry},
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Offline demo: runs one scripted turn through the full loop without
/// a live model or board connection.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Board Intelligence Agent demo starting");

    let reasoner = Box::new(ScriptedReasoner::new(vec![
        ReasonerReply::ToolCalls(vec![ToolCall {
            id: "call_1".to_string(),
            name: "get_data_summary".to_string(),
            arguments: json!({ "board": "both" }),
        }]),
        ReasonerReply::Answer(
            "Demo run complete. Wire up board and LLM credentials and start the `api` \
             binary for live answers."
                .to_string(),
        ),
    ]));

    // Empty registry: the scripted tool call comes back as an error
    // payload, which still exercises dispatch, tracing, and recovery.
    let dispatcher = Dispatcher::new(Arc::new(ToolRegistry::new()));
    let orchestrator = Orchestrator::new(reasoner, dispatcher);

    let outcome = orchestrator
        .run_turn(Vec::new(), "How is the business doing?", None)
        .await?;

    println!("\n=== Response ===\n{}", outcome.response);
    println!("\n=== Traces ===");
    for trace in &outcome.traces {
        println!(
            "- {} [{:?}] {} ({} items, {} ms)",
            trace.tool_name,
            trace.status,
            trace.result_summary,
            trace.items_returned,
            trace.duration_ms
        );
    }
    if !outcome.caveats.is_empty() {
        println!("\n=== Caveats ===");
        for caveat in &outcome.caveats {
            println!("- {}", caveat);
        }
    }

    Ok(())
}
