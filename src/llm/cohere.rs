//! Cohere embed, chat and rerank endpoints over HTTP.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, Sender};

use crate::config::ApiKey;
use crate::error::{Error, RemoteFailure, Result};
use crate::llm::{
    Conversation, Embedding, EmbeddingBackend, ModelProvider, ModelSet, PromptBackend,
    RerankBackend,
};
use crate::store::Passage;

/// The embed endpoint accepts at most this many texts per call.
const EMBED_BATCH_SIZE: usize = 96;

#[derive(Debug, Clone)]
pub struct CohereSettings {
    pub base_url: String,
    pub chat_model: String,
    pub embed_model: String,
    pub rerank_model: String,
    pub temperature: f32,
    /// Applies to embed and rerank calls and to connecting. Streamed
    /// generation is not time-limited.
    pub timeout: Duration,
}

impl Default for CohereSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.cohere.ai".to_string(),
            chat_model: "command".to_string(),
            embed_model: "embed-english-v3.0".to_string(),
            rerank_model: "rerank-english-v2.0".to_string(),
            temperature: 0.3,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    input_type: &'a str,
    truncate: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Embedding>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    model: &'a str,
    stream: bool,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatStreamEvent {
    event_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

#[derive(Debug, PartialEq)]
pub enum StreamEvent {
    Text(String),
    End,
    Failed(String),
    Other,
}

pub fn parse_stream_line(line: &str) -> Result<StreamEvent> {
    let line = line.trim();
    let line = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    if line.is_empty() {
        return Ok(StreamEvent::Other);
    }

    let event: ChatStreamEvent = serde_json::from_str(line)
        .map_err(|e| Error::permanent(format!("malformed stream event: {e}")))?;

    Ok(match event.event_type.as_str() {
        "text-generation" => StreamEvent::Text(event.text.unwrap_or_default()),
        "stream-end" => match event.finish_reason.as_deref() {
            None | Some("COMPLETE") | Some("MAX_TOKENS") => StreamEvent::End,
            Some(reason) => StreamEvent::Failed(format!("generation stopped: {reason}")),
        },
        _ => StreamEvent::Other,
    })
}

/// Reassembles newline-delimited records from arbitrarily split byte chunks.
#[derive(Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

pub fn classify_status(status: StatusCode) -> RemoteFailure {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        RemoteFailure::Transient
    } else {
        RemoteFailure::Permanent
    }
}

fn network_error(e: reqwest::Error) -> Error {
    if e.is_decode() || e.is_builder() {
        Error::permanent(e.to_string())
    } else {
        Error::transient(e.to_string())
    }
}

#[derive(Clone)]
pub struct CohereBackend {
    client: Client,
    api_key: ApiKey,
    settings: Arc<CohereSettings>,
}

impl CohereBackend {
    pub fn new(api_key: ApiKey, settings: Arc<CohereSettings>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("could not build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            settings,
        })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let url = format!(
            "{}/v1/{}",
            self.settings.base_url.trim_end_matches('/'),
            path
        );

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .header("Accept", "application/json")
            .json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Remote {
                kind: classify_status(status),
                message: format!("Cohere {path} request failed with status {status}: {error_text}"),
            });
        }

        Ok(response)
    }

    async fn embed(&self, texts: &[String], input_type: &str) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let request = EmbedRequest {
                texts: batch,
                model: &self.settings.embed_model,
                input_type,
                truncate: "END",
            };
            let response: EmbedResponse = self
                .post("embed", &request, Some(self.settings.timeout))
                .await?
                .json()
                .await
                .map_err(|e| Error::permanent(format!("unexpected embed response: {e}")))?;

            if response.embeddings.len() != batch.len() {
                return Err(Error::permanent(format!(
                    "embed returned {} vectors for {} texts",
                    response.embeddings.len(),
                    batch.len()
                )));
            }
            embeddings.extend(response.embeddings);
        }

        Ok(embeddings)
    }
}

enum Flow {
    Continue,
    Finished,
    Stop,
}

async fn forward(line: &str, tx: &Sender<Result<String>>) -> Flow {
    match parse_stream_line(line) {
        Ok(StreamEvent::Text(text)) => {
            if tx.send(Ok(text)).await.is_ok() {
                Flow::Continue
            } else {
                // receiver dropped: the caller cancelled
                Flow::Stop
            }
        }
        Ok(StreamEvent::Other) => Flow::Continue,
        Ok(StreamEvent::End) => Flow::Finished,
        Ok(StreamEvent::Failed(reason)) => {
            let _ = tx.send(Err(Error::permanent(reason))).await;
            Flow::Stop
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            Flow::Stop
        }
    }
}

async fn relay_events(response: Response, tx: Sender<Result<String>>) {
    let mut body = response.bytes_stream();
    let mut lines = LineBuffer::default();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(Err(network_error(e))).await;
                return;
            }
        };
        for line in lines.push(&chunk) {
            match forward(&line, &tx).await {
                Flow::Continue => {}
                Flow::Finished | Flow::Stop => return,
            }
        }
    }

    if let Some(line) = lines.finish() {
        match forward(&line, &tx).await {
            Flow::Continue => {}
            Flow::Finished | Flow::Stop => return,
        }
    }

    let _ = tx
        .send(Err(Error::transient("answer stream ended before completion")))
        .await;
}

#[async_trait::async_trait]
impl EmbeddingBackend for CohereBackend {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        tracing::debug!("Embedding {} chunks", texts.len());
        self.embed(texts, "search_document").await
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.embed(&[text.to_string()], "search_query")
            .await?
            .pop()
            .ok_or_else(|| Error::permanent("embed returned no vector for the query"))
    }
}

#[async_trait::async_trait]
impl PromptBackend for CohereBackend {
    async fn chat_stream(&self, prompt: &str) -> Result<Conversation> {
        let request = ChatRequest {
            message: prompt,
            model: &self.settings.chat_model,
            stream: true,
            temperature: self.settings.temperature,
        };
        let response = self.post("chat", &request, None).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(relay_events(response, tx));

        Ok(rx)
    }
}

#[async_trait::async_trait]
impl RerankBackend for CohereBackend {
    async fn rerank(
        &self,
        query: &str,
        passages: Vec<Passage>,
        top_n: usize,
    ) -> Result<Vec<Passage>> {
        if passages.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let request = RerankRequest {
            model: &self.settings.rerank_model,
            query,
            documents: passages.iter().map(|p| p.text.as_str()).collect(),
            top_n,
        };
        let response: RerankResponse = self
            .post("rerank", &request, Some(self.settings.timeout))
            .await?
            .json()
            .await
            .map_err(|e| Error::permanent(format!("unexpected rerank response: {e}")))?;

        let mut slots: Vec<Option<Passage>> = passages.into_iter().map(Some).collect();
        let mut ranked = Vec::with_capacity(top_n);
        for result in response.results {
            if let Some(passage) = slots.get_mut(result.index).and_then(Option::take) {
                ranked.push(Passage {
                    score: result.relevance_score,
                    ..passage
                });
            }
        }
        ranked.truncate(top_n);

        Ok(ranked)
    }
}

pub struct CohereProvider {
    settings: Arc<CohereSettings>,
}

impl CohereProvider {
    pub fn new(settings: CohereSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

impl ModelProvider for CohereProvider {
    fn connect(&self, api_key: &ApiKey) -> Result<ModelSet> {
        let backend = Arc::new(CohereBackend::new(
            api_key.clone(),
            Arc::clone(&self.settings),
        )?);

        Ok(ModelSet {
            embed: backend.clone(),
            llm: backend.clone(),
            reranker: backend,
        })
    }
}
