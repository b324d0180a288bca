use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::context_store::ContextEntry;
use crate::repositories::error::StoreResult;
use crate::repositories::object_store::ObjectStore;

/// One markdown note visible under the configured bucket prefix.
#[derive(Debug, Clone)]
pub struct NoteFile {
    pub key: String,
    /// Key with the bucket prefix stripped; what the user sees.
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Lists and fetches the markdown notes a user can attach as context.
pub struct NoteBrowser {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl NoteBrowser {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// List every markdown note under the prefix.
    /// Folder placeholders and non-markdown objects are skipped.
    pub async fn list(&self) -> StoreResult<Vec<NoteFile>> {
        let listed = self.store.list(&self.prefix).await?;

        Ok(listed
            .into_iter()
            .filter(|meta| !meta.key.ends_with('/'))
            .filter(|meta| meta.key.ends_with(".md"))
            .map(|meta| {
                let name = meta
                    .key
                    .strip_prefix(&self.prefix)
                    .unwrap_or(&meta.key)
                    .to_string();
                NoteFile {
                    key: meta.key,
                    name,
                    size: meta.size,
                    modified: meta.last_modified,
                }
            })
            .collect())
    }

    /// Fetch one note's full contents.
    pub async fn fetch(&self, key: &str) -> StoreResult<String> {
        let bytes = self.store.get(key).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Fetch a note and shape it for the context store.
    pub async fn fetch_entry(&self, note: &NoteFile) -> StoreResult<ContextEntry> {
        let text = self.fetch(&note.key).await?;
        Ok(ContextEntry {
            key: note.key.clone(),
            display_name: note.name.clone(),
            text,
        })
    }
}
