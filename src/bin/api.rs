use board_bi_agent::{
    agent::Orchestrator,
    api::{start_server, AppState},
    board::BoardClient,
    config::Config,
    llm::OpenAiReasoner,
    session::InMemorySessionStore,
    tools::{create_default_registry, dispatch::Dispatcher},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config = Arc::new(Config::from_env());

    info!("Board Intelligence Agent - API server");
    info!("Port: {}", config.port);

    // Create components
    let board_client = Arc::new(BoardClient::new(
        config.board_api_url.clone(),
        config.board_api_key.clone(),
    ));
    let registry = create_default_registry(board_client.clone(), config.clone());
    let dispatcher = Dispatcher::new(Arc::new(registry));
    let reasoner = Box::new(OpenAiReasoner::new(
        config.llm_api_key.clone(),
        config.llm_base_url.clone(),
        config.llm_model.clone(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(reasoner, dispatcher));
    let sessions = Arc::new(InMemorySessionStore::new());

    info!("Orchestrator initialized");

    let port = config.port;
    let state = AppState {
        orchestrator,
        sessions,
        board_client,
        config,
    };

    start_server(state, port).await?;

    Ok(())
}
