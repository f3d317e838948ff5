use docchat::config::Config;
use docchat::llm::cohere::CohereProvider;
use docchat::qdrant::VectorDB;
use docchat::routes::router;
use docchat::state::{AppState, AppStateBuilder};

use std::env;
use std::sync::Arc;

#[shuttle_runtime::main]
async fn main(
    #[shuttle_qdrant::Qdrant(
        cloud_url = "{secrets.QDRANT_URL}",
        api_key = "{secrets.QDRANT_API_KEY}"
    )]
    qdrant: qdrant_client::prelude::QdrantClient,
    #[shuttle_runtime::Secrets] secrets: shuttle_runtime::SecretStore,
) -> shuttle_axum::ShuttleAxum {
    secrets.into_iter().for_each(|x| {
        if x.1 != String::new() {
            env::set_var(x.0, x.1);
        }
    });

    let config = Config::from_env().map_err(anyhow::Error::from)?;
    let provider = CohereProvider::new(config.cohere.clone());

    let vector_db = VectorDB::from_qdrant_client(qdrant);

    let state = AppStateBuilder::new(config, provider)
        .with_vector_db(vector_db)
        .build()
        .map_err(anyhow::Error::from)?;
    let state = Arc::new(state);

    let cloned_state: Arc<AppState<CohereProvider>> = Arc::clone(&state);

    tokio::spawn(async move {
        cloned_state.run_session_reaper().await;
    });

    Ok(router(state).into())
}
