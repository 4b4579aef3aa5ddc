//! Error types for the board BI agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Board API Errors
    // =============================

    #[error("Board API transport error: {0}")]
    Transport(String),

    #[error("Board API rate limited: retry after {0}s")]
    RateLimited(u64),

    #[error("Board API query error: {0}")]
    RemoteQuery(String),

    #[error("Unexpected board API response: {0}")]
    MalformedResponse(String),

    // =============================
    // Orchestration Errors
    // =============================

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidToolArgs(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
