use std::sync::Arc;

use tracing::warn;

use crate::models::chat_index::ChatSummary;
use crate::models::transcript::ChatRecord;

use super::error::StoreResult;
use super::object_store::ObjectStore;

/// Namespace under the bucket prefix where chat records live.
const CHATS_NAMESPACE: &str = "chats/";

/// Chat-record persistence over the object store.
/// Stores each conversation as one JSON document at
/// `<prefix>chats/<id>.json`.
pub struct ChatStore {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ChatStore {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn chats_prefix(&self) -> String {
        format!("{}{}", self.prefix, CHATS_NAMESPACE)
    }

    fn record_key(&self, id: &str) -> String {
        format!("{}{}.json", self.chats_prefix(), id)
    }

    /// Write one conversation record.
    pub async fn save(&self, record: &ChatRecord) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        self.store
            .put(&self.record_key(&record.id), bytes, "application/json")
            .await
    }

    /// Load one conversation record by id.
    pub async fn load(&self, id: &str) -> StoreResult<ChatRecord> {
        let bytes = self.store.get(&self.record_key(id)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Delete one conversation record by id.
    pub async fn remove(&self, id: &str) -> StoreResult<()> {
        self.store.delete(&self.record_key(id)).await
    }

    /// Rebuild the chat-index projection by reading every record's metadata.
    ///
    /// Best-effort over whatever is readable: a record that cannot be
    /// fetched or parsed is skipped, not fatal. Ordering is left to the
    /// caller (`ChatIndex` sorts most-recent-first).
    pub async fn list_summaries(&self) -> StoreResult<Vec<ChatSummary>> {
        let listed = self.store.list(&self.chats_prefix()).await?;

        let mut summaries = Vec::with_capacity(listed.len());
        for meta in listed {
            let bytes = match self.store.get(&meta.key).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(key = %meta.key, error = %err, "Skipping unreadable chat record");
                    continue;
                }
            };

            match serde_json::from_slice::<ChatRecord>(&bytes) {
                Ok(record) => summaries.push(ChatSummary {
                    id: record.id,
                    title: record.title,
                    updated_at: record.updated,
                }),
                Err(err) => {
                    warn!(key = %meta.key, error = %err, "Skipping unparseable chat record");
                }
            }
        }

        Ok(summaries)
    }
}
