use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{chat, error::Result, llm::ModelProvider, state::AppState};

#[derive(Deserialize)]
pub struct Prompt {
    prompt: String,
}

pub async fn prompt<P: ModelProvider>(
    State(app_state): State<Arc<AppState<P>>>,
    Path(id): Path<Uuid>,
    Json(Prompt { prompt }): Json<Prompt>,
) -> Result<impl IntoResponse> {
    let session = app_state.sessions.get(id).await?;

    let answer = chat::submit(&session, &prompt)
        .await
        .inspect_err(|e| tracing::warn!("Something went wrong while prompting: {e}"))?;

    tracing::debug!("Answering from {} passages", answer.sources.len());

    Ok(axum_streams::StreamBodyAs::text(answer.chunks))
}
