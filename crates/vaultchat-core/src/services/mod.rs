pub mod deeplink;
pub mod diagnostics;
pub mod notes;
pub mod relay;
pub mod sse;

pub use notes::{NoteBrowser, NoteFile};
pub use relay::{ChatRequest, HttpRelay, ModelRelay, RelayError};
pub use sse::{ProviderEvent, decode_stream};
