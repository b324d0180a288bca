pub mod chat_index;
pub mod context_store;
pub mod session;
pub mod transcript;

pub use chat_index::{ChatIndex, ChatSummary};
pub use context_store::{ContextEntry, ContextStore};
pub use session::{ChatSession, SessionError, SessionEvent, SessionPhase, StreamOutcome};
pub use transcript::{ChatMessage, ChatRecord, Role, Transcript, Turn};
