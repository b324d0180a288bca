use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use crate::models::chat_index::{ChatIndex, ChatSummary};
use crate::models::context_store::{ContextEntry, ContextStore};
use crate::models::session::{
    ChatSession, PreparedTurn, SessionError, SessionEvent, SessionPhase, StreamOutcome,
};
use crate::models::transcript::Transcript;
use crate::repositories::chat_store::ChatStore;
use crate::repositories::error::StoreResult;
use crate::services::relay::{ChatRequest, ModelRelay};
use crate::services::sse::{ProviderEvent, decode_stream};

/// Orchestrates the chat session against its collaborators: merges the
/// transcript and context selection into relay requests, drives the stream
/// decoder, and keeps the persisted records and chat index in sync.
///
/// The session lock is held per discrete event, never across network I/O,
/// so chat switching stays responsive while a stream is in flight.
pub struct ChatController {
    session: Mutex<ChatSession>,
    context: Mutex<ContextStore>,
    index: Mutex<ChatIndex>,
    relay: Arc<dyn ModelRelay>,
    chats: ChatStore,
    model: String,
    max_tokens: u32,
}

impl ChatController {
    pub fn new(
        relay: Arc<dyn ModelRelay>,
        chats: ChatStore,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (session, events) = ChatSession::new();

        (
            Self {
                session: Mutex::new(session),
                context: Mutex::new(ContextStore::new()),
                index: Mutex::new(ChatIndex::new()),
                relay,
                chats,
                model: model.into(),
                max_tokens,
            },
            events,
        )
    }

    /// Submit one user turn and drive it to a terminal state.
    ///
    /// Returns `Err` only for caller mistakes (busy session, empty text);
    /// operational failures surface through `SessionEvent`s so partial
    /// output is never lost.
    pub async fn submit(&self, text: &str) -> Result<(), SessionError> {
        let PreparedTurn { messages, epoch } = {
            let context = self.context.lock().snapshot();
            self.session.lock().begin_turn(text, &context)?
        };

        let request = ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages,
            stream: true,
        };

        let bytes = match self.relay.open_stream(request).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.session.lock().stream_failed(epoch, err.to_string());
                return Ok(());
            }
        };
        self.session.lock().stream_opened(epoch);

        let mut events = decode_stream(bytes);
        while let Some(event) = events.next().await {
            match event {
                Ok(ProviderEvent::ContentDelta(fragment)) => {
                    self.session.lock().apply_delta(epoch, &fragment);
                }
                Ok(ProviderEvent::Error(message)) => {
                    self.session.lock().stream_failed(epoch, message);
                    return Ok(());
                }
                Err(err) => {
                    self.session.lock().stream_failed(epoch, err.to_string());
                    return Ok(());
                }
            }
        }

        if self.session.lock().finish_stream(epoch) == StreamOutcome::Committed {
            self.persist_active().await;
        }

        Ok(())
    }

    /// Persist the active transcript and refresh the index on success.
    /// Failure is surfaced as a warning; the in-memory transcript stays
    /// authoritative.
    async fn persist_active(&self) {
        let record = self.session.lock().prepare_persist(Utc::now());
        let Some(record) = record else {
            return;
        };

        match self.chats.save(&record).await {
            Ok(()) => {
                if let Err(err) = self.refresh_index().await {
                    warn!(error = %err, "Chat index refresh failed after persist");
                }
            }
            Err(err) => {
                warn!(chat_id = %record.id, error = %err, "Failed to persist chat record");
                self.session.lock().note_persist_failed(err.to_string());
            }
        }
    }

    /// Rebuild the chat index from storage, most-recently-updated first.
    pub async fn refresh_index(&self) -> StoreResult<Vec<ChatSummary>> {
        let summaries = self.chats.list_summaries().await?;

        let mut index = self.index.lock();
        index.replace(summaries);
        Ok(index.entries().to_vec())
    }

    /// Load a saved conversation and make it the active transcript.
    pub async fn select_chat(&self, id: &str) -> StoreResult<()> {
        let record = self.chats.load(id).await?;
        self.session
            .lock()
            .replace_transcript(Transcript::from_record(record));
        Ok(())
    }

    /// Start a fresh conversation, abandoning any in-flight stream.
    pub fn new_chat(&self) {
        self.session.lock().reset();
    }

    /// Delete a saved conversation. Deleting the active one resets the
    /// session to a fresh empty transcript.
    pub async fn delete_chat(&self, id: &str) -> StoreResult<()> {
        self.chats.remove(id).await?;

        {
            let mut session = self.session.lock();
            if session.active_id() == Some(id) {
                session.reset();
            }
        }

        if let Err(err) = self.refresh_index().await {
            warn!(error = %err, "Chat index refresh failed after delete");
        }
        Ok(())
    }

    pub fn attach_note(&self, entry: ContextEntry) {
        self.context.lock().attach(entry);
    }

    pub fn detach_note(&self, key: &str) -> bool {
        self.context.lock().detach(key)
    }

    pub fn context_entries(&self) -> Vec<ContextEntry> {
        self.context.lock().snapshot()
    }

    pub fn is_busy(&self) -> bool {
        self.session.lock().phase() != SessionPhase::Idle
    }

    /// Copy of the active transcript, for rendering.
    pub fn transcript_snapshot(&self) -> Transcript {
        self.session.lock().transcript().clone()
    }

    pub fn index_snapshot(&self) -> Vec<ChatSummary> {
        self.index.lock().entries().to_vec()
    }
}
