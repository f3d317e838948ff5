use anyhow::Result;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use docchat::config::Config;
use docchat::llm::cohere::CohereProvider;
use docchat::routes::router;
use docchat::state::{AppState, AppStateBuilder};

use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docchat=info,standalone=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let provider = CohereProvider::new(config.cohere.clone());

    let state = AppStateBuilder::new(config, provider).build()?;
    let state = Arc::new(state);

    let cloned_state: Arc<AppState<CohereProvider>> = Arc::clone(&state);

    tokio::spawn(async move {
        cloned_state.run_session_reaper().await;
    });

    let addr = state.config.bind_addr;
    let rtr = router(state);

    let tcp = TcpListener::bind(addr).await?;

    tracing::info!("Starting up server on {addr}...");
    axum::serve(tcp, rtr).await?;

    Ok(())
}
