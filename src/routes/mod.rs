pub mod documents;
pub mod prompt;
pub mod sessions;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::llm::ModelProvider;
use crate::state::AppState;

pub fn router<P: ModelProvider>(state: Arc<AppState<P>>) -> Router {
    let static_dir = state.config.static_dir.clone();
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/sessions", post(sessions::create_session::<P>))
        .route(
            "/sessions/:id",
            get(sessions::get_session::<P>).delete(sessions::delete_session::<P>),
        )
        .route("/sessions/:id/reset", post(sessions::reset_chat::<P>))
        .route("/sessions/:id/documents", post(documents::upload::<P>))
        .route("/sessions/:id/preview", get(documents::preview::<P>))
        .route("/sessions/:id/prompt", post(prompt::prompt::<P>))
        .fallback_service(ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
