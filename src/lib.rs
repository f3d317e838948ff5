pub mod cache;
pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod files;
pub mod llm;
pub mod prompt;
pub mod qdrant;
pub mod routes;
pub mod session;
pub mod staging;
pub mod state;
pub mod store;

pub use error::{Error, Result};

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use cache::CacheKey;
use config::ApiKey;
use engine::QueryEngine;
use files::load_documents_from_dir;
use llm::ModelProvider;
use session::SessionHandle;
use staging::{stage, validate_file_name, Upload, REQUIRED_EXTENSION};
use state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct IndexOutcome {
    pub file_name: String,
    pub cache_key: String,
    pub reused: bool,
    pub chunks: usize,
}

/// Makes `upload` the session's active document, building its query engine
/// unless one is already cached for the same name and content.
pub async fn index_upload<P: ModelProvider>(
    state: &AppState<P>,
    session: &SessionHandle,
    upload: Upload,
    api_key: Option<ApiKey>,
) -> Result<IndexOutcome> {
    let file_name = validate_file_name(&upload.file_name)?;
    let api_key = api_key
        .or_else(|| state.config.default_api_key.clone())
        .ok_or(Error::MissingApiKey)?;

    let key = CacheKey::new(session.id, &file_name, upload.fingerprint());

    let _build = session.build_guard().await;

    let cached = {
        let guard = session.lock().await;
        if guard.is_closed() {
            return Err(Error::SessionNotFound(session.id));
        }
        guard.lookup(&key)
    };
    if let Some(engine) = cached {
        tracing::debug!("Reusing cached engine for {key}");
        session.lock().await.activate(key.clone(), upload.bytes);
        return Ok(IndexOutcome {
            file_name,
            cache_key: key.to_string(),
            reused: true,
            chunks: engine.chunk_count(),
        });
    }

    tracing::info!("Indexing {file_name} for session {}", session.id);

    let staging = state.config.staging.clone();
    let reader = Arc::clone(&state.reader);
    let staged_upload = upload.clone();
    let documents = tokio::task::spawn_blocking(move || {
        let staged = stage(&staging, &staged_upload)?;
        load_documents_from_dir(staged.dir(), REQUIRED_EXTENSION, staged.dir(), reader.as_ref())
    })
    .await
    .map_err(|e| Error::IndexBuild(format!("document loader stopped: {e}")))??;

    if documents.is_empty() {
        return Err(Error::EmptyDocument(file_name));
    }

    let models = state.provider.connect(&api_key)?;
    let store = state.stores.open(&format!("docchat-{}", Uuid::new_v4()));
    let engine = QueryEngine::build(
        documents,
        models,
        store,
        state.template.clone(),
        state.config.retrieval.clone(),
    )
    .await?;
    let chunks = engine.chunk_count();
    let engine = Arc::new(engine);

    let evicted = {
        let mut guard = session.lock().await;
        if guard.is_closed() {
            drop(guard);
            tracing::info!("Session {} closed during indexing; dropping {file_name}", session.id);
            engine.release().await;
            return Err(Error::SessionNotFound(session.id));
        }
        let evicted = guard.cache_insert(key.clone(), engine);
        guard.activate(key.clone(), upload.bytes);
        evicted
    };
    for engine in evicted {
        tokio::spawn(async move { engine.release().await });
    }

    tracing::info!("Ready to chat about {file_name}");

    Ok(IndexOutcome {
        file_name,
        cache_key: key.to_string(),
        reused: false,
        chunks,
    })
}
