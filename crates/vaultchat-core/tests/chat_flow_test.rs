//! End-to-end exercise of the public API: submit a turn against a scripted
//! relay, watch it stream, commit, persist, and land in the chat index.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use parking_lot::Mutex;

use vaultchat_core::controllers::ChatController;
use vaultchat_core::models::session::SessionEvent;
use vaultchat_core::models::transcript::Role;
use vaultchat_core::repositories::chat_store::ChatStore;
use vaultchat_core::repositories::memory_store::MemoryObjectStore;
use vaultchat_core::repositories::object_store::{BoxFuture, ObjectStore};
use vaultchat_core::services::relay::{ChatRequest, ModelRelay, RelayError};
use vaultchat_core::services::sse::ByteStream;

/// Relay double that records each request and replays a fixed SSE body.
struct ReplayRelay {
    body: String,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ReplayRelay {
    fn new(body: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            body: body.into(),
            requests: Mutex::new(Vec::new()),
        })
    }
}

impl ModelRelay for ReplayRelay {
    fn open_stream(
        &self,
        request: ChatRequest,
    ) -> BoxFuture<'static, Result<ByteStream, RelayError>> {
        self.requests.lock().push(request);
        let body = Bytes::from(self.body.clone());

        Box::pin(async move { Ok(Box::pin(stream::iter([Ok(body)])) as ByteStream) })
    }

    fn complete(&self, _request: ChatRequest) -> BoxFuture<'static, Result<String, RelayError>> {
        Box::pin(async { Err(RelayError::Http("streaming only".to_string())) })
    }
}

fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        body.push_str(&format!(
            "data: {{\"type\":\"content_block_delta\",\"delta\":{{\"type\":\"text_delta\",\"text\":\"{fragment}\"}}}}\n"
        ));
    }
    body.push_str("data: [DONE]\n");
    body
}

#[tokio::test]
async fn test_full_turn_reaches_storage_and_index() {
    let relay = ReplayRelay::new(sse_body(&["Hel", "lo"]));
    let objects = Arc::new(MemoryObjectStore::new());
    let chats = ChatStore::new(objects.clone(), "vault/");

    let (controller, mut events) =
        ChatController::new(relay.clone(), chats, "claude-sonnet-4-5-20250929", 4096);

    controller.submit("Hi").await.unwrap();

    // The outbound request carried the single bare user message.
    let requests = relay.requests.lock();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].stream);
    assert_eq!(requests[0].messages.len(), 1);
    assert_eq!(requests[0].messages[0].content, "Hi");
    drop(requests);

    // The committed transcript and the durable record agree.
    let transcript = controller.transcript_snapshot();
    assert_eq!(transcript.turns().len(), 2);
    assert_eq!(transcript.turns()[1].role, Role::Assistant);
    assert_eq!(transcript.turns()[1].text, "Hello");

    let stored = objects.list("vault/chats/").await.unwrap();
    assert_eq!(stored.len(), 1);

    let index = controller.refresh_index().await.unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index[0].id, transcript.id().unwrap());

    // Deltas arrived as growing accumulated text.
    let mut delta_texts = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::AssistantDelta { text } = event {
            delta_texts.push(text);
        }
    }
    assert_eq!(delta_texts, ["Hel", "Hello"]);
}

#[tokio::test]
async fn test_attached_note_rides_the_opening_message() {
    let relay = ReplayRelay::new(sse_body(&["Summary."]));
    let objects = Arc::new(MemoryObjectStore::new());
    objects
        .put("vault/notes/a.md", b"Alpha".to_vec(), "text/markdown")
        .await
        .unwrap();

    let chats = ChatStore::new(objects.clone(), "vault/");
    let (controller, _events) =
        ChatController::new(relay.clone(), chats, "claude-sonnet-4-5-20250929", 4096);

    let browser = vaultchat_core::services::notes::NoteBrowser::new(objects, "vault/");
    let notes = browser.list().await.unwrap();
    controller.attach_note(browser.fetch_entry(&notes[0]).await.unwrap());

    controller.submit("Summarize").await.unwrap();

    let requests = relay.requests.lock();
    let opening = &requests[0].messages[0].content;
    assert!(opening.find("notes/a.md").unwrap() < opening.find("Summarize").unwrap());
    assert!(opening.find("Alpha").unwrap() < opening.find("Summarize").unwrap());

    // The stored record keeps the raw question, not the composed prompt.
    let transcript = controller.transcript_snapshot();
    assert_eq!(transcript.turns()[0].text, "Summarize");
    assert_eq!(transcript.derive_title(), "Summarize");
}
