#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};

use docchat::config::{ApiKey, Config};
use docchat::error::{Error, Result};
use docchat::files::DocumentReader;
use docchat::llm::{
    Conversation, Embedding, EmbeddingBackend, ModelProvider, ModelSet, PromptBackend,
    RerankBackend,
};
use docchat::routes::router;
use docchat::state::{AppState, AppStateBuilder};
use docchat::store::Passage;

const DIMENSIONS: usize = 64;

/// Bag-of-words hashing embedder: texts sharing words point the same way.
pub struct HashEmbedder {
    builds: Arc<AtomicUsize>,
    gate: Option<Arc<Notify>>,
}

fn embed_text(text: &str) -> Embedding {
    let mut vector = vec![0.0; DIMENSIONS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let hash = word
            .to_lowercase()
            .bytes()
            .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
        vector[(hash % DIMENSIONS as u64) as usize] += 1.0;
    }
    vector
}

#[async_trait::async_trait]
impl EmbeddingBackend for HashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        Ok(embed_text(text))
    }
}

#[derive(Clone)]
pub enum LlmMode {
    /// Answers with the retrieved context, a few characters per chunk.
    Echo,
    /// Streams exactly these chunks.
    Script(Vec<String>),
    /// Streams these chunks, then fails.
    FailAfter(Vec<String>),
    /// Streams these chunks, then never finishes.
    Hold(Vec<String>),
}

pub struct FakeLlm {
    mode: LlmMode,
}

fn context_of(prompt: &str) -> String {
    let mut sections = prompt.split("---------------------\n");
    sections.nth(1).unwrap_or_default().trim().to_string()
}

#[async_trait::async_trait]
impl PromptBackend for FakeLlm {
    async fn chat_stream(&self, prompt: &str) -> Result<Conversation> {
        let (tx, rx) = mpsc::channel(8);
        let mode = self.mode.clone();
        let context = context_of(prompt);

        tokio::spawn(async move {
            match mode {
                LlmMode::Echo => {
                    let answer = format!("From the document: {context}");
                    let chars: Vec<char> = answer.chars().collect();
                    for piece in chars.chunks(5) {
                        if tx.send(Ok(piece.iter().collect())).await.is_err() {
                            return;
                        }
                    }
                }
                LlmMode::Script(chunks) => {
                    for chunk in chunks {
                        let _ = tx.send(Ok(chunk)).await;
                    }
                }
                LlmMode::FailAfter(chunks) => {
                    for chunk in chunks {
                        let _ = tx.send(Ok(chunk)).await;
                    }
                    let _ = tx.send(Err(Error::transient("connection reset"))).await;
                }
                LlmMode::Hold(chunks) => {
                    for chunk in chunks {
                        let _ = tx.send(Ok(chunk)).await;
                    }
                    let _keep_open = tx;
                    std::future::pending::<()>().await;
                }
            }
        });

        Ok(rx)
    }
}

pub struct KeepTop;

#[async_trait::async_trait]
impl RerankBackend for KeepTop {
    async fn rerank(
        &self,
        _query: &str,
        mut passages: Vec<Passage>,
        top_n: usize,
    ) -> Result<Vec<Passage>> {
        passages.truncate(top_n);
        Ok(passages)
    }
}

pub struct FakeProvider {
    pub builds: Arc<AtomicUsize>,
    pub mode: LlmMode,
    /// When set, document embedding waits for a permit.
    pub gate: Option<Arc<Notify>>,
}

impl FakeProvider {
    pub fn new(mode: LlmMode) -> Self {
        Self {
            builds: Arc::new(AtomicUsize::new(0)),
            mode,
            gate: None,
        }
    }
}

impl ModelProvider for FakeProvider {
    fn connect(&self, _api_key: &ApiKey) -> Result<ModelSet> {
        Ok(ModelSet {
            embed: Arc::new(HashEmbedder {
                builds: Arc::clone(&self.builds),
                gate: self.gate.clone(),
            }),
            llm: Arc::new(FakeLlm {
                mode: self.mode.clone(),
            }),
            reranker: Arc::new(KeepTop),
        })
    }
}

/// Treats every staged file as UTF-8 text.
pub struct TextReader;

impl DocumentReader for TextReader {
    fn read(&self, path: &Path) -> Result<String> {
        Ok(String::from_utf8_lossy(&std::fs::read(path)?).into_owned())
    }
}

pub fn test_config() -> Config {
    Config {
        default_api_key: ApiKey::new("test-key"),
        static_dir: "does-not-exist".into(),
        ..Config::default()
    }
}

/// Returns the state and a handle on its build counter.
pub fn test_state(mode: LlmMode) -> (Arc<AppState<FakeProvider>>, Arc<AtomicUsize>) {
    test_state_with(test_config(), mode)
}

pub fn test_state_with(
    config: Config,
    mode: LlmMode,
) -> (Arc<AppState<FakeProvider>>, Arc<AtomicUsize>) {
    build_state(config, FakeProvider::new(mode))
}

/// Document embedding blocks until the returned gate is notified.
pub fn gated_state() -> (Arc<AppState<FakeProvider>>, Arc<AtomicUsize>, Arc<Notify>) {
    let gate = Arc::new(Notify::new());
    let provider = FakeProvider {
        gate: Some(Arc::clone(&gate)),
        ..FakeProvider::new(LlmMode::Echo)
    };
    let (state, builds) = build_state(test_config(), provider);
    (state, builds, gate)
}

fn build_state(
    config: Config,
    provider: FakeProvider,
) -> (Arc<AppState<FakeProvider>>, Arc<AtomicUsize>) {
    let builds = Arc::clone(&provider.builds);
    let state = AppStateBuilder::new(config, provider)
        .with_reader(Arc::new(TextReader))
        .build()
        .expect("test state");
    (Arc::new(state), builds)
}

pub async fn spawn_app(state: Arc<AppState<FakeProvider>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn script(chunks: &[&str]) -> LlmMode {
    LlmMode::Script(chunks.iter().map(|c| c.to_string()).collect())
}
