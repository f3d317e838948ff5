//! Query engine: a vector index over one upload plus the models that
//! answer questions against it.

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::files::Document;
use crate::llm::{Conversation, ModelSet};
use crate::prompt::PromptTemplate;
use crate::store::{Passage, Record, VectorStore};

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub similarity_top_k: usize,
    pub rerank_top_n: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            similarity_top_k: 2,
            rerank_top_n: 2,
            chunk_size: 1024,
            chunk_overlap: 200,
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<()> {
        if self.similarity_top_k == 0 || self.rerank_top_n == 0 || self.chunk_size == 0 {
            return Err(Error::Configuration(
                "top-k, top-n and chunk size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Configuration(
                "chunk overlap must be smaller than the chunk size".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct QueryResponse {
    pub sources: Vec<Passage>,
    pub tokens: Conversation,
}

pub struct QueryEngine {
    id: Uuid,
    models: ModelSet,
    store: Box<dyn VectorStore>,
    template: PromptTemplate,
    settings: RetrievalSettings,
    chunk_count: usize,
    // held shared while a query reads the store, exclusively by release
    retrieving: RwLock<()>,
}

impl QueryEngine {
    pub async fn build(
        mut documents: Vec<Document>,
        models: ModelSet,
        store: Box<dyn VectorStore>,
        template: PromptTemplate,
        settings: RetrievalSettings,
    ) -> Result<Self> {
        let mut texts = Vec::new();
        let mut sources = Vec::new();
        for document in &mut documents {
            document.parse(settings.chunk_size, settings.chunk_overlap);
            tracing::debug!("{} split into {} chunks", document.name, document.chunks.len());
            for chunk in &document.chunks {
                texts.push(chunk.clone());
                sources.push(document.name.clone());
            }
        }

        if texts.is_empty() {
            let names: Vec<_> = documents.iter().map(|d| d.name.as_str()).collect();
            return Err(Error::EmptyDocument(names.join(", ")));
        }

        let embeddings = models.embed.embed_documents(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(Error::IndexBuild(format!(
                "received {} embeddings for {} chunks",
                embeddings.len(),
                texts.len()
            )));
        }
        let dimensions = embeddings[0].len();

        store.prepare(dimensions).await?;

        let records = embeddings
            .into_iter()
            .zip(texts.into_iter().zip(sources))
            .enumerate()
            .map(|(id, (vector, (text, source)))| Record {
                id: id as u64,
                vector,
                text,
                source,
            })
            .collect::<Vec<_>>();
        let chunk_count = records.len();

        if let Err(e) = store.upsert(records).await {
            if let Err(cleanup) = store.destroy().await {
                tracing::warn!("Failed to clean up a partial index: {cleanup}");
            }
            return Err(e);
        }

        let id = Uuid::new_v4();
        tracing::info!("Engine {id} indexed {chunk_count} chunks");

        Ok(Self {
            id,
            models,
            store,
            template,
            settings,
            chunk_count,
            retrieving: RwLock::new(()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub async fn query(&self, question: &str) -> Result<QueryResponse> {
        let candidates = {
            let _reading = self.retrieving.read().await;
            let embedding = self.models.embed.embed_query(question).await?;
            self.store
                .search(&embedding, self.settings.similarity_top_k)
                .await?
        };

        let sources = self
            .models
            .reranker
            .rerank(question, candidates, self.settings.rerank_top_n)
            .await?;

        let context = sources
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = self.template.format(&context, question);

        let tokens = self.models.llm.chat_stream(&prompt).await?;

        Ok(QueryResponse { sources, tokens })
    }

    /// Waits for in-flight retrievals before dropping the store.
    pub async fn release(&self) {
        let _exclusive = self.retrieving.write().await;
        if let Err(e) = self.store.destroy().await {
            tracing::warn!("Failed to release engine {}: {e}", self.id);
        }
    }
}
