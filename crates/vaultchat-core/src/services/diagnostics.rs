use crate::models::transcript::{ChatMessage, Role};
use crate::repositories::object_store::ObjectStore;

use super::relay::{ChatRequest, ModelRelay};

/// Outcome of probing both external collaborators.
#[derive(Debug)]
pub struct ConnectionReport {
    pub relay: Result<(), String>,
    pub storage: Result<(), String>,
}

impl ConnectionReport {
    pub fn is_ok(&self) -> bool {
        self.relay.is_ok() && self.storage.is_ok()
    }
}

/// Probe the relay with a minimal completion and the object store with a
/// listing. Neither failure blocks the other probe.
pub async fn check_connection(
    relay: &dyn ModelRelay,
    store: &dyn ObjectStore,
    prefix: &str,
    model: &str,
) -> ConnectionReport {
    let request = ChatRequest {
        model: model.to_string(),
        max_tokens: 10,
        messages: vec![ChatMessage {
            role: Role::User,
            content: "Hi".to_string(),
        }],
        stream: false,
    };

    let relay_result = relay
        .complete(request)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string());

    let storage_result = store
        .list(prefix)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string());

    ConnectionReport {
        relay: relay_result,
        storage: storage_result,
    }
}
