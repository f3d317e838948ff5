//! Question/answer loop for a session.

use std::sync::Arc;

use tokio::sync::mpsc::{self, Sender};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{Error, Result};
use crate::llm::Conversation;
use crate::session::{Role, SessionHandle};
use crate::store::Passage;

/// Prefix sent to the client when generation fails part-way.
pub const ERROR_MARKER: &str = "\n\n[error] ";

pub struct Answer {
    pub sources: Vec<Passage>,
    pub chunks: ReceiverStream<String>,
}

/// Asks the session's active engine `question`.
///
/// The user turn is recorded immediately. The assistant turn is recorded
/// once the whole answer has streamed through; a failed, cancelled or reset
/// generation records nothing.
pub async fn submit(session: &Arc<SessionHandle>, question: &str) -> Result<Answer> {
    let question = question.trim();
    if question.is_empty() {
        return Err(Error::EmptyQuestion);
    }

    let (engine, generation) = {
        let mut state = session.lock().await;
        let engine = state.active_engine()?;
        let generation = state.begin_generation()?;
        state.push_turn(Role::User, question);
        (engine, generation)
    };

    let response = match engine.query(question).await {
        Ok(response) => response,
        Err(e) => {
            session.lock().await.abandon_generation(generation);
            return Err(e);
        }
    };

    let (tx, rx) = mpsc::channel(32);

    let mut state = session.lock().await;
    if !state.is_current(generation) {
        // reset while retrieving
        return Ok(Answer {
            sources: response.sources,
            chunks: ReceiverStream::new(rx),
        });
    }

    let handle = tokio::spawn(relay(
        Arc::clone(session),
        generation,
        response.tokens,
        tx,
    ));
    state.attach_generation(generation, handle.abort_handle());
    drop(state);

    Ok(Answer {
        sources: response.sources,
        chunks: ReceiverStream::new(rx),
    })
}

async fn relay(
    session: Arc<SessionHandle>,
    generation: u64,
    mut tokens: Conversation,
    tx: Sender<String>,
) {
    let mut answer = String::new();

    while let Some(chunk) = tokens.recv().await {
        match chunk {
            Ok(text) => {
                answer.push_str(&text);
                if tx.send(text).await.is_err() {
                    tracing::info!("Client left session {} mid-answer", session.id);
                    session.lock().await.finish_generation(generation);
                    return;
                }
            }
            Err(e) => {
                tracing::warn!("Answer failed in session {}: {e}", session.id);
                let _ = tx.send(format!("{ERROR_MARKER}{e}")).await;
                session.lock().await.finish_generation(generation);
                return;
            }
        }
    }

    let mut state = session.lock().await;
    if state.finish_generation(generation) {
        state.push_turn(Role::Assistant, answer);
    }
    // the client stream closes only after the turn is recorded
    drop(state);
    drop(tx);
}
