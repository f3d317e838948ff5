use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::qdrant::VectorDB;

/// A retrieved piece of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub text: String,
    pub source: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct Record {
    pub id: u64,
    pub vector: Vec<f32>,
    pub text: String,
    pub source: String,
}

#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    async fn prepare(&self, dimensions: usize) -> Result<()>;
    async fn upsert(&self, records: Vec<Record>) -> Result<()>;
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<Passage>>;
    async fn destroy(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub enum VectorStoreKind {
    Memory,
    Qdrant { url: String, api_key: Option<String> },
}

/// Opens a fresh, isolated store for each engine.
#[derive(Clone)]
pub enum StoreFactory {
    Memory,
    Qdrant(VectorDB),
}

impl StoreFactory {
    pub fn from_kind(kind: &VectorStoreKind) -> Result<Self> {
        match kind {
            VectorStoreKind::Memory => Ok(StoreFactory::Memory),
            VectorStoreKind::Qdrant { url, api_key } => {
                Ok(StoreFactory::Qdrant(VectorDB::new(url, api_key.clone())?))
            }
        }
    }

    pub fn open(&self, name: &str) -> Box<dyn VectorStore> {
        match self {
            StoreFactory::Memory => Box::new(MemoryStore::default()),
            StoreFactory::Qdrant(db) => Box::new(db.collection(name)),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    dimensions: RwLock<Option<usize>>,
    records: RwLock<Vec<Record>>,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait::async_trait]
impl VectorStore for MemoryStore {
    async fn prepare(&self, dimensions: usize) -> Result<()> {
        *self.dimensions.write().await = Some(dimensions);
        self.records.write().await.clear();
        Ok(())
    }

    async fn upsert(&self, records: Vec<Record>) -> Result<()> {
        let dimensions = *self.dimensions.read().await;
        let Some(dimensions) = dimensions else {
            return Err(Error::VectorStore("store was not prepared".to_string()));
        };
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimensions) {
            return Err(Error::VectorStore(format!(
                "record {} has {} dimensions, expected {dimensions}",
                bad.id,
                bad.vector.len()
            )));
        }

        let mut lock = self.records.write().await;
        for record in records {
            match lock.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => lock.push(record),
            }
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<Passage>> {
        let lock = self.records.read().await;
        let mut scored: Vec<Passage> = lock
            .iter()
            .map(|r| Passage {
                text: r.text.clone(),
                source: r.source.clone(),
                score: cosine_similarity(&r.vector, vector),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn destroy(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, vector: Vec<f32>, text: &str) -> Record {
        Record {
            id,
            vector,
            text: text.to_string(),
            source: "a.pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let store = MemoryStore::default();
        store.prepare(2).await.unwrap();
        store
            .upsert(vec![
                record(0, vec![1.0, 0.0], "east"),
                record(1, vec![0.0, 1.0], "north"),
                record(2, vec![0.7, 0.7], "north-east"),
            ])
            .await
            .unwrap();

        let hits = store.search(&[0.0, 1.0], 2).await.unwrap();
        let texts: Vec<_> = hits.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["north", "north-east"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_requires_prepare_and_matching_dimensions() {
        let store = MemoryStore::default();
        assert!(store.upsert(vec![record(0, vec![1.0], "x")]).await.is_err());

        store.prepare(2).await.unwrap();
        assert!(matches!(
            store.upsert(vec![record(0, vec![1.0], "x")]).await,
            Err(Error::VectorStore(_))
        ));
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = MemoryStore::default();
        store.prepare(1).await.unwrap();
        store.upsert(vec![record(0, vec![1.0], "old")]).await.unwrap();
        store.upsert(vec![record(0, vec![1.0], "new")]).await.unwrap();

        let hits = store.search(&[1.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "new");
    }

    #[tokio::test]
    async fn factory_follows_the_configured_kind() {
        let memory = StoreFactory::from_kind(&VectorStoreKind::Memory).unwrap();
        assert!(matches!(memory, StoreFactory::Memory));

        let qdrant = StoreFactory::from_kind(&VectorStoreKind::Qdrant {
            url: "http://localhost:6334".into(),
            api_key: None,
        })
        .unwrap();
        assert!(matches!(qdrant, StoreFactory::Qdrant(_)));
    }

    #[tokio::test]
    async fn memory_stores_are_isolated() {
        let factory = StoreFactory::Memory;
        let first = factory.open("docchat-a");
        let second = factory.open("docchat-b");

        first.prepare(1).await.unwrap();
        second.prepare(1).await.unwrap();
        first.upsert(vec![record(0, vec![1.0], "only here")]).await.unwrap();

        assert_eq!(first.search(&[1.0], 5).await.unwrap().len(), 1);
        assert!(second.search(&[1.0], 5).await.unwrap().is_empty());

        first.destroy().await.unwrap();
        assert!(first.search(&[1.0], 5).await.unwrap().is_empty());
    }

    #[test]
    fn zero_vectors_have_zero_similarity() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
