use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a derived conversation title, in characters.
const TITLE_MAX_CHARS: usize = 50;

/// Title used before any user turn exists.
const UNTITLED: &str = "New Chat";

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One role-tagged message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Wire and persistence shape of one turn (`{role, content}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// One persisted conversation, serialized as a single JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    pub updated: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

/// The ordered turn history plus persistence metadata for one conversation.
///
/// `id` stays `None` until the first successful persist assigns one; from
/// then on it is permanent for this conversation's lifetime.
#[derive(Debug, Clone)]
pub struct Transcript {
    id: Option<String>,
    created: Option<DateTime<Utc>>,
    updated: DateTime<Utc>,
    turns: Vec<Turn>,
}

impl Transcript {
    /// Create a fresh, never-persisted conversation.
    pub fn new() -> Self {
        Self {
            id: None,
            created: None,
            updated: Utc::now(),
            turns: Vec::new(),
        }
    }

    /// Restore a conversation from its persisted record.
    pub fn from_record(record: ChatRecord) -> Self {
        let turns = record
            .messages
            .into_iter()
            .map(|message| Turn {
                role: message.role,
                text: message.content,
            })
            .collect();

        Self {
            id: Some(record.id),
            created: record.created,
            updated: record.updated,
            turns,
        }
    }

    /// Append a user turn to the history.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::User,
            text: text.into(),
        });
        self.updated = Utc::now();
    }

    /// Append a completed assistant turn to the history.
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::Assistant,
            text: text.into(),
        });
        self.updated = Utc::now();
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    fn first_user_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .find(|turn| turn.role == Role::User)
            .map(|turn| turn.text.as_str())
    }

    /// Title shown in the chat index: the first user turn truncated to
    /// 50 characters.
    pub fn derive_title(&self) -> String {
        match self.first_user_text() {
            Some(text) => text.chars().take(TITLE_MAX_CHARS).collect(),
            None => UNTITLED.to_string(),
        }
    }

    /// Stamp the transcript for persistence and produce its record.
    ///
    /// Assigns an id on the first call, sets `created` exactly once, and
    /// advances `updated` every call. Returns `None` for an empty
    /// transcript, which has nothing worth writing.
    pub fn prepare_persist(&mut self, now: DateTime<Utc>) -> Option<ChatRecord> {
        if self.turns.is_empty() {
            return None;
        }

        let id = match &self.id {
            Some(id) => id.clone(),
            None => {
                let id = generate_chat_id(now);
                self.id = Some(id.clone());
                id
            }
        };

        if self.created.is_none() {
            self.created = Some(now);
        }
        self.updated = now;

        Some(ChatRecord {
            id,
            title: self.derive_title(),
            created: self.created,
            updated: self.updated,
            messages: self
                .turns
                .iter()
                .map(|turn| ChatMessage {
                    role: turn.role,
                    content: turn.text.clone(),
                })
                .collect(),
        })
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a sortable, storage-key-safe conversation id from a timestamp.
/// `:` and `.` are the only RFC 3339 characters unsafe in object keys.
pub fn generate_chat_id(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}
