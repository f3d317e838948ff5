use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::llm::ModelProvider;
use crate::session::SessionView;
use crate::state::AppState;

pub async fn create_session<P: ModelProvider>(
    State(state): State<Arc<AppState<P>>>,
) -> impl IntoResponse {
    let session = state.sessions.create().await;
    (StatusCode::CREATED, Json(json!({ "id": session.id })))
}

pub async fn get_session<P: ModelProvider>(
    State(state): State<Arc<AppState<P>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>> {
    let handle = state.sessions.get(id).await?;
    let session = handle.lock().await;
    Ok(Json(session.view()))
}

pub async fn delete_session<P: ModelProvider>(
    State(state): State<Arc<AppState<P>>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let handle = state.sessions.remove(id).await?;
    handle.close().await;
    Ok(StatusCode::NO_CONTENT)
}

/// Clears the transcript. Indexed documents stay available.
pub async fn reset_chat<P: ModelProvider>(
    State(state): State<Arc<AppState<P>>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let handle = state.sessions.get(id).await?;
    handle.lock().await.reset();
    Ok(StatusCode::NO_CONTENT)
}
