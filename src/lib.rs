//! Board Intelligence Agent
//!
//! A business-intelligence agent over two record-management boards:
//! - Fetches LIVE board data through a retrying GraphQL client
//! - Reconciles dirty tabular records into typed rows, with caveats
//! - Computes pipeline, billing, and cross-board lifecycle metrics
//! - Drives an LLM tool loop with a hard iteration cap
//! - Serves chat over HTTP, blocking or SSE-streamed
//!
//! TURN LOOP:
//! QUESTION → REASON → TOOLS → OBSERVE → ... → ANSWER

pub mod agent;
pub mod api;
pub mod board;
pub mod clean;
pub mod config;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod session;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use config::Config;
pub use models::*;
