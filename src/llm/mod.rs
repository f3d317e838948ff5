pub mod cohere;

use std::sync::Arc;

use tokio::sync::mpsc::Receiver;

use crate::config::ApiKey;
use crate::error::Result;
use crate::store::Passage;

pub type Embedding = Vec<f32>;

/// Incremental answer text, in generation order. A failure ends the stream.
pub type Conversation = Receiver<Result<String>>;

#[async_trait::async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>>;
    async fn embed_query(&self, text: &str) -> Result<Embedding>;
}

#[async_trait::async_trait]
pub trait PromptBackend: Send + Sync {
    async fn chat_stream(&self, prompt: &str) -> Result<Conversation>;
}

#[async_trait::async_trait]
pub trait RerankBackend: Send + Sync {
    /// Returns at most `top_n` passages, most relevant first.
    async fn rerank(&self, query: &str, passages: Vec<Passage>, top_n: usize)
        -> Result<Vec<Passage>>;
}

/// The models one query engine talks to. Each engine owns its own set.
#[derive(Clone)]
pub struct ModelSet {
    pub embed: Arc<dyn EmbeddingBackend>,
    pub llm: Arc<dyn PromptBackend>,
    pub reranker: Arc<dyn RerankBackend>,
}

/// Produces model sets bound to a caller-supplied credential.
pub trait ModelProvider: Send + Sync + 'static {
    fn connect(&self, api_key: &ApiKey) -> Result<ModelSet>;
}
