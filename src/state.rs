use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::files::{DocumentReader, PdfReader};
use crate::llm::ModelProvider;
use crate::prompt::PromptTemplate;
use crate::qdrant::VectorDB;
use crate::session::SessionStore;
use crate::store::StoreFactory;

pub struct AppState<P: ModelProvider> {
    pub config: Config,
    pub sessions: SessionStore,
    pub provider: P,
    pub stores: StoreFactory,
    pub reader: Arc<dyn DocumentReader>,
    pub template: PromptTemplate,
}

impl<P: ModelProvider> AppState<P> {
    /// Closes sessions that have been idle for longer than the configured TTL.
    pub async fn run_session_reaper(&self) {
        let period = (self.config.session_ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;

            for session in self.sessions.expire(self.config.session_ttl).await {
                tracing::info!("Session {} expired", session.id);
                session.close().await;
            }
        }
    }
}

pub struct AppStateBuilder<P: ModelProvider> {
    config: Config,
    provider: P,
    stores: Option<StoreFactory>,
    reader: Option<Arc<dyn DocumentReader>>,
}

impl<P: ModelProvider> AppStateBuilder<P> {
    pub fn new(config: Config, provider: P) -> Self {
        Self {
            config,
            provider,
            stores: None,
            reader: None,
        }
    }

    pub fn with_vector_db(mut self, db: VectorDB) -> Self {
        self.stores = Some(StoreFactory::Qdrant(db));
        self
    }

    pub fn with_store_factory(mut self, stores: StoreFactory) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn with_reader(mut self, reader: Arc<dyn DocumentReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn build(self) -> Result<AppState<P>> {
        let template = match &self.config.prompt_template {
            Some(path) => PromptTemplate::from_file(path)?,
            None => PromptTemplate::default(),
        };

        let stores = match self.stores {
            Some(stores) => stores,
            None => StoreFactory::from_kind(&self.config.vector_store)?,
        };

        Ok(AppState {
            sessions: SessionStore::new(self.config.cache_capacity),
            config: self.config,
            provider: self.provider,
            stores,
            reader: self.reader.unwrap_or_else(|| Arc::new(PdfReader)),
            template,
        })
    }
}
