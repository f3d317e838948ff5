use qdrant_client::prelude::{
    CreateCollection, Distance, Payload, PointStruct, QdrantClient, QdrantClientConfig,
};
use qdrant_client::qdrant::{
    value::Kind, vectors_config::Config, with_payload_selector::SelectorOptions, ScoredPoint,
    SearchPoints, VectorParams, VectorsConfig, WithPayloadSelector,
};
use serde_json::json;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::store::{Passage, Record, VectorStore};

fn store_error(e: impl std::fmt::Display) -> Error {
    Error::VectorStore(e.to_string())
}

/// Shared Qdrant connection. Each engine gets its own collection.
#[derive(Clone)]
pub struct VectorDB {
    client: Arc<QdrantClient>,
}

impl VectorDB {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        let cfg = QdrantClientConfig::from_url(url).with_api_key(api_key);
        let client = QdrantClient::new(Some(cfg)).map_err(store_error)?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub fn from_qdrant_client(client: QdrantClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn collection(&self, name: &str) -> QdrantCollection {
        QdrantCollection {
            client: Arc::clone(&self.client),
            name: name.to_string(),
        }
    }
}

pub struct QdrantCollection {
    client: Arc<QdrantClient>,
    name: String,
}

fn payload_string(point: &ScoredPoint, key: &str) -> Option<String> {
    let value = point.payload.get(key)?;
    let kind = value.kind.to_owned()?;
    if let Kind::StringValue(value) = kind {
        Some(value)
    } else {
        None
    }
}

// points without text were not written by this crate
fn to_passage(point: &ScoredPoint) -> Option<Passage> {
    Some(Passage {
        text: payload_string(point, "text")?,
        source: payload_string(point, "source").unwrap_or_default(),
        score: point.score,
    })
}

#[async_trait::async_trait]
impl VectorStore for QdrantCollection {
    async fn prepare(&self, dimensions: usize) -> Result<()> {
        self.client
            .create_collection(&CreateCollection {
                collection_name: self.name.clone(),
                vectors_config: Some(VectorsConfig {
                    config: Some(Config::Params(VectorParams {
                        size: dimensions as u64,
                        distance: Distance::Cosine.into(),
                        hnsw_config: None,
                        quantization_config: None,
                        on_disk: None,
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })
            .await
            .map_err(store_error)?;

        tracing::debug!("Created collection {}", self.name);
        Ok(())
    }

    async fn upsert(&self, records: Vec<Record>) -> Result<()> {
        let mut points = Vec::with_capacity(records.len());
        for record in records {
            let payload: Payload = json!({
                "text": record.text,
                "source": record.source,
            })
            .try_into()
            .map_err(|_| Error::VectorStore("payload must be a JSON object".to_string()))?;

            points.push(PointStruct::new(record.id, record.vector, payload));
        }

        self.client
            .upsert_points(self.name.clone(), None, points, None)
            .await
            .map_err(store_error)?;

        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<Passage>> {
        let payload_selector = WithPayloadSelector {
            selector_options: Some(SelectorOptions::Enable(true)),
        };

        let search_points = SearchPoints {
            collection_name: self.name.clone(),
            vector: vector.to_vec(),
            limit: limit as u64,
            with_payload: Some(payload_selector),
            ..Default::default()
        };

        let search_result = self
            .client
            .search_points(&search_points)
            .await
            .map_err(store_error)?;

        Ok(search_result.result.iter().filter_map(to_passage).collect())
    }

    async fn destroy(&self) -> Result<()> {
        self.client
            .delete_collection(self.name.clone())
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
