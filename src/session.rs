//! Per-user state: transcript, index cache and the active document.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::cache::{CacheKey, IndexCache};
use crate::engine::QueryEngine;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatState {
    Idle,
    Ready,
}

pub struct ActiveDocument {
    pub key: CacheKey,
    pub bytes: Bytes,
}

struct Generation {
    id: u64,
    handle: Option<AbortHandle>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub state: ChatState,
    pub active_file: Option<String>,
    pub transcript: Vec<Turn>,
    pub cached_engines: usize,
    pub created_at: DateTime<Utc>,
}

pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    transcript: Vec<Turn>,
    cache: IndexCache<QueryEngine>,
    active: Option<ActiveDocument>,
    generation: Option<Generation>,
    next_generation: u64,
    closed: bool,
}

impl Session {
    pub fn new(id: Uuid, cache_capacity: Option<usize>) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_seen: now,
            transcript: Vec::new(),
            cache: IndexCache::new(cache_capacity),
            active: None,
            generation: None,
            next_generation: 0,
            closed: false,
        }
    }

    pub fn state(&self) -> ChatState {
        match self.active {
            Some(_) => ChatState::Ready,
            None => ChatState::Idle,
        }
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn push_turn(&mut self, role: Role, content: impl Into<String>) {
        self.transcript.push(Turn {
            role,
            content: content.into(),
        });
    }

    pub fn cache(&self) -> &IndexCache<QueryEngine> {
        &self.cache
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<Arc<QueryEngine>> {
        self.cache.lookup(key)
    }

    pub fn cache_insert(&mut self, key: CacheKey, engine: Arc<QueryEngine>) -> Vec<Arc<QueryEngine>> {
        self.cache.insert(key, engine)
    }

    pub fn activate(&mut self, key: CacheKey, bytes: Bytes) {
        self.active = Some(ActiveDocument { key, bytes });
    }

    pub fn active(&self) -> Option<&ActiveDocument> {
        self.active.as_ref()
    }

    pub fn active_engine(&self) -> Result<Arc<QueryEngine>> {
        self.active
            .as_ref()
            .and_then(|doc| self.cache.lookup(&doc.key))
            .ok_or(Error::NotReady)
    }

    pub fn begin_generation(&mut self) -> Result<u64> {
        if self.generation.is_some() {
            return Err(Error::Busy);
        }
        self.next_generation += 1;
        let id = self.next_generation;
        self.generation = Some(Generation { id, handle: None });
        Ok(id)
    }

    pub fn is_current(&self, id: u64) -> bool {
        self.generation.as_ref().is_some_and(|g| g.id == id)
    }

    pub fn attach_generation(&mut self, id: u64, handle: AbortHandle) {
        match self.generation.as_mut() {
            Some(generation) if generation.id == id => generation.handle = Some(handle),
            _ => handle.abort(),
        }
    }

    /// Releases the slot. Returns false if a reset already took it.
    pub fn finish_generation(&mut self, id: u64) -> bool {
        if self.is_current(id) {
            self.generation = None;
            true
        } else {
            false
        }
    }

    pub fn abandon_generation(&mut self, id: u64) {
        if self.finish_generation(id)
            && self.transcript.last().is_some_and(|t| t.role == Role::User)
        {
            self.transcript.pop();
        }
    }

    pub fn is_generating(&self) -> bool {
        self.generation.is_some()
    }

    /// Clears the transcript and stops any answer in progress. Cached
    /// engines and the active document are kept.
    pub fn reset(&mut self) {
        self.transcript.clear();
        if let Some(generation) = self.generation.take() {
            if let Some(handle) = generation.handle {
                handle.abort();
            }
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Nothing may be cached once this has run.
    pub fn close(&mut self) -> Vec<Arc<QueryEngine>> {
        self.reset();
        self.closed = true;
        self.active = None;
        self.cache.drain()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            state: self.state(),
            active_file: self.active.as_ref().map(|doc| doc.key.file_name.clone()),
            transcript: self.transcript.clone(),
            cached_engines: self.cache.len(),
            created_at: self.created_at,
        }
    }
}

pub struct SessionHandle {
    pub id: Uuid,
    state: Mutex<Session>,
    build_lock: Mutex<()>,
}

impl SessionHandle {
    fn new(session: Session) -> Self {
        Self {
            id: session.id,
            state: Mutex::new(session),
            build_lock: Mutex::new(()),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.state.lock().await
    }

    pub async fn build_guard(&self) -> MutexGuard<'_, ()> {
        self.build_lock.lock().await
    }

    pub async fn close(&self) {
        let engines = self.lock().await.close();
        for engine in engines {
            engine.release().await;
        }
    }
}

pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<SessionHandle>>>,
    cache_capacity: Option<usize>,
}

impl SessionStore {
    pub fn new(cache_capacity: Option<usize>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            cache_capacity,
        }
    }

    pub async fn create(&self) -> Arc<SessionHandle> {
        let id = Uuid::new_v4();
        let handle = Arc::new(SessionHandle::new(Session::new(id, self.cache_capacity)));
        self.sessions.write().await.insert(id, Arc::clone(&handle));
        tracing::info!("Created session {id}");
        handle
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<SessionHandle>> {
        let handle = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::SessionNotFound(id))?;
        handle.lock().await.touch();
        Ok(handle)
    }

    pub async fn remove(&self, id: Uuid) -> Result<Arc<SessionHandle>> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or(Error::SessionNotFound(id))?;
        tracing::info!("Removed session {id}");
        Ok(handle)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Removes sessions idle for longer than `ttl` and hands them back for
    /// closing. Sessions with an answer in progress are kept.
    pub async fn expire(&self, ttl: Duration) -> Vec<Arc<SessionHandle>> {
        let cutoff = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl));
        let Some(cutoff) = cutoff else {
            return Vec::new();
        };

        let handles: Vec<Arc<SessionHandle>> =
            self.sessions.read().await.values().cloned().collect();

        let mut stale = Vec::new();
        for handle in handles {
            let session = handle.lock().await;
            if session.last_seen() <= cutoff && !session.is_generating() {
                stale.push(handle.id);
            }
        }

        let mut sessions = self.sessions.write().await;
        stale
            .into_iter()
            .filter_map(|id| sessions.remove(&id))
            .collect()
    }
}
