use chrono::{DateTime, Utc};

/// Metadata for one saved conversation, as shown in the conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

/// Read-only, rebuildable listing of all persisted conversations,
/// most-recently-updated first.
#[derive(Debug, Default)]
pub struct ChatIndex {
    entries: Vec<ChatSummary>,
}

impl ChatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole listing with a freshly-read projection.
    pub fn replace(&mut self, mut entries: Vec<ChatSummary>) {
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        self.entries = entries;
    }

    pub fn entries(&self) -> &[ChatSummary] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&ChatSummary> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
