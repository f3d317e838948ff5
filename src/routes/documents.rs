use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    response::Html,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ApiKey;
use crate::error::{Error, Result};
use crate::llm::ModelProvider;
use crate::staging::Upload;
use crate::state::AppState;
use crate::IndexOutcome;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Serialize)]
pub struct UploadResult {
    pub file_name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<IndexOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

pub async fn upload<P: ModelProvider>(
    State(state): State<Arc<AppState<P>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Vec<UploadResult>>> {
    let session = state.sessions.get(id).await?;

    let mut api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(ApiKey::new);

    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Upload(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("api_key") => {
                let text = field.text().await.map_err(|e| Error::Upload(e.to_string()))?;
                if api_key.is_none() {
                    api_key = ApiKey::new(text);
                }
            }
            Some("file") | Some("files") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| Error::Upload(e.to_string()))?;
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                uploads.push(Upload::new(file_name, bytes));
            }
            _ => {}
        }
    }

    if uploads.is_empty() {
        return Err(Error::NoFile);
    }

    let mut results = Vec::with_capacity(uploads.len());
    let mut first_error = None;
    let mut indexed_any = false;

    for upload in uploads {
        let file_name = upload.file_name.clone();
        match crate::index_upload(&state, &session, upload, api_key.clone()).await {
            Ok(outcome) => {
                indexed_any = true;
                results.push(UploadResult {
                    file_name,
                    status: "ready",
                    outcome: Some(outcome),
                    error: None,
                    error_kind: None,
                });
            }
            Err(e) => {
                tracing::warn!("An error occurred while indexing {file_name}: {e}");
                results.push(UploadResult {
                    file_name,
                    status: "failed",
                    outcome: None,
                    error: Some(e.to_string()),
                    error_kind: Some(e.kind()),
                });
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if !indexed_any => Err(e),
        _ => Ok(Json(results)),
    }
}

/// Embeds the active document in an iframe.
pub async fn preview<P: ModelProvider>(
    State(state): State<Arc<AppState<P>>>,
    Path(id): Path<Uuid>,
) -> Result<Html<String>> {
    let handle = state.sessions.get(id).await?;
    let session = handle.lock().await;
    let active = session.active().ok_or(Error::NotReady)?;

    let encoded = STANDARD.encode(&active.bytes);
    Ok(Html(format!(
        r#"<iframe src="data:application/pdf;base64,{encoded}" width="400" height="100%" type="application/pdf" style="height:100vh; width:100%"></iframe>"#
    )))
}
