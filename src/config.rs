//! Service configuration read from the environment.

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::RetrievalSettings;
use crate::error::{Error, Result};
use crate::llm::cohere::CohereSettings;
use crate::staging::StagingMode;
use crate::store::VectorStoreKind;

/// A credential supplied at runtime. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for blank input.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub static_dir: PathBuf,
    pub default_api_key: Option<ApiKey>,
    pub cohere: CohereSettings,
    pub retrieval: RetrievalSettings,
    pub staging: StagingMode,
    pub vector_store: VectorStoreKind,
    /// `None` keeps every engine for the lifetime of its session.
    pub cache_capacity: Option<usize>,
    pub session_ttl: Duration,
    pub max_upload_bytes: usize,
    pub prompt_template: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            static_dir: PathBuf::from("static"),
            default_api_key: None,
            cohere: CohereSettings::default(),
            retrieval: RetrievalSettings::default(),
            staging: StagingMode::PerUpload,
            vector_store: VectorStoreKind::Memory,
            cache_capacity: None,
            session_ttl: Duration::from_secs(3600),
            max_upload_bytes: 50 * 1024 * 1024,
            prompt_template: None,
        }
    }
}

impl Config {
    /// Create configuration from environment variables, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let cohere = CohereSettings {
            base_url: var("COHERE_BASE_URL").unwrap_or(defaults.cohere.base_url),
            chat_model: var("COHERE_CHAT_MODEL").unwrap_or(defaults.cohere.chat_model),
            embed_model: var("COHERE_EMBED_MODEL").unwrap_or(defaults.cohere.embed_model),
            rerank_model: var("COHERE_RERANK_MODEL").unwrap_or(defaults.cohere.rerank_model),
            temperature: parsed("DOCCHAT_TEMPERATURE")?.unwrap_or(defaults.cohere.temperature),
            timeout: parsed::<u64>("COHERE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.cohere.timeout),
        };

        let retrieval = RetrievalSettings {
            similarity_top_k: parsed("DOCCHAT_SIMILARITY_TOP_K")?
                .unwrap_or(defaults.retrieval.similarity_top_k),
            rerank_top_n: parsed("DOCCHAT_RERANK_TOP_N")?
                .unwrap_or(defaults.retrieval.rerank_top_n),
            chunk_size: parsed("DOCCHAT_CHUNK_SIZE")?.unwrap_or(defaults.retrieval.chunk_size),
            chunk_overlap: parsed("DOCCHAT_CHUNK_OVERLAP")?
                .unwrap_or(defaults.retrieval.chunk_overlap),
        };
        retrieval.validate()?;

        let staging = match var("DOCCHAT_STAGING_DIR") {
            Some(dir) => StagingMode::Shared(PathBuf::from(dir)),
            None => StagingMode::PerUpload,
        };

        let vector_store = match var("DOCCHAT_VECTOR_STORE").as_deref() {
            None | Some("memory") => VectorStoreKind::Memory,
            Some("qdrant") => VectorStoreKind::Qdrant {
                url: var("QDRANT_URL").unwrap_or_else(|| {
                    tracing::warn!("No QDRANT_URL env var found! Defaulting to localhost:6334...");
                    "http://localhost:6334".to_string()
                }),
                api_key: var("QDRANT_API_KEY"),
            },
            Some(other) => {
                return Err(Error::Configuration(format!(
                    "DOCCHAT_VECTOR_STORE must be 'memory' or 'qdrant', got '{other}'"
                )))
            }
        };

        Ok(Self {
            bind_addr: parsed("DOCCHAT_ADDR")?.unwrap_or(defaults.bind_addr),
            static_dir: var("DOCCHAT_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            default_api_key: var("COHERE_API_KEY").and_then(ApiKey::new),
            cohere,
            retrieval,
            staging,
            vector_store,
            cache_capacity: parsed("DOCCHAT_CACHE_CAPACITY")?,
            session_ttl: parsed::<u64>("DOCCHAT_SESSION_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            max_upload_bytes: parsed("DOCCHAT_MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
            prompt_template: var("DOCCHAT_PROMPT_TEMPLATE").map(PathBuf::from),
        })
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parsed<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Configuration(format!("{name}={raw:?} is invalid: {e}")))
        })
        .transpose()
}
