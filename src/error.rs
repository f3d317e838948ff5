//! Error types surfaced to users of the service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

/// Whether retrying a failed remote call can reasonably succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFailure {
    Transient,
    Permanent,
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteFailure::Transient => f.write_str("transient"),
            RemoteFailure::Permanent => f.write_str("permanent"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("no file was provided")]
    NoFile,

    #[error("unsupported file type for '{0}': only .pdf files are accepted")]
    UnsupportedFileType(String),

    #[error("no readable text could be extracted from '{0}'")]
    EmptyDocument(String),

    #[error("index build failed: {0}")]
    IndexBuild(String),

    #[error("remote call failed ({kind}): {message}")]
    Remote {
        kind: RemoteFailure,
        message: String,
    },

    #[error("an API key is required")]
    MissingApiKey,

    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("no document has been indexed in this session yet")]
    NotReady,

    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("a question is already being answered in this session")]
    Busy,

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upload error: {0}")]
    Upload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn transient(message: impl Into<String>) -> Self {
        Error::Remote {
            kind: RemoteFailure::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Error::Remote {
            kind: RemoteFailure::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Remote {
                kind: RemoteFailure::Transient,
                ..
            }
        )
    }

    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NoFile => "no_file",
            Error::UnsupportedFileType(_) => "unsupported_file_type",
            Error::EmptyDocument(_) => "empty_document",
            Error::IndexBuild(_) => "index_build_failed",
            Error::Remote { .. } => "remote_call_failed",
            Error::MissingApiKey => "missing_api_key",
            Error::SessionNotFound(_) => "session_not_found",
            Error::NotReady => "not_ready",
            Error::EmptyQuestion => "empty_question",
            Error::Busy => "busy",
            Error::VectorStore(_) => "vector_store",
            Error::Configuration(_) => "configuration",
            Error::Upload(_) => "upload",
            Error::Io(_) => "io",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::NoFile | Error::EmptyQuestion | Error::Upload(_) => StatusCode::BAD_REQUEST,
            Error::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::EmptyDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::MissingApiKey => StatusCode::UNAUTHORIZED,
            Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Error::NotReady | Error::Busy => StatusCode::CONFLICT,
            Error::Remote {
                kind: RemoteFailure::Transient,
                ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Remote {
                kind: RemoteFailure::Permanent,
                ..
            } => StatusCode::BAD_GATEWAY,
            Error::IndexBuild(_)
            | Error::VectorStore(_)
            | Error::Configuration(_)
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
            "transient": self.is_transient(),
        });

        (self.status(), Json(body)).into_response()
    }
}
