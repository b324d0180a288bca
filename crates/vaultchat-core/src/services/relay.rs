use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::transcript::ChatMessage;
use crate::repositories::object_store::BoxFuture;

use super::sse::ByteStream;

/// Provider API version forwarded on every request.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Fixed output budget for a completion turn.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Body of one relay request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Request failed: {0}")]
    Http(String),

    #[error("API error {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Stream read error: {0}")]
    Stream(String),

    #[error("Empty response from provider")]
    EmptyResponse,
}

/// Boundary to the model-provider relay.
///
/// The session manager only ever sees this trait; the production
/// implementation speaks HTTP, tests script byte streams directly.
pub trait ModelRelay: Send + Sync + 'static {
    /// Open a streaming completion and return the raw event byte stream.
    fn open_stream(&self, request: ChatRequest) -> BoxFuture<'static, Result<ByteStream, RelayError>>;

    /// Run a non-streaming completion and return the full response text.
    fn complete(&self, request: ChatRequest) -> BoxFuture<'static, Result<String, RelayError>>;
}

/// Non-streaming response body: `{content: [{text}]}`.
#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// HTTP client for the relay endpoint.
pub struct HttpRelay {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpRelay {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn post(&self, request: &ChatRequest) -> reqwest::RequestBuilder {
        self.client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
    }
}

impl ModelRelay for HttpRelay {
    fn open_stream(
        &self,
        mut request: ChatRequest,
    ) -> BoxFuture<'static, Result<ByteStream, RelayError>> {
        request.stream = true;
        let builder = self.post(&request);

        Box::pin(async move {
            let response = builder
                .send()
                .await
                .map_err(|e| RelayError::Http(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(RelayError::Status {
                    status: status.as_u16(),
                    detail: error_detail(&body, status),
                });
            }

            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| RelayError::Stream(e.to_string())));

            Ok(Box::pin(stream) as ByteStream)
        })
    }

    fn complete(&self, mut request: ChatRequest) -> BoxFuture<'static, Result<String, RelayError>> {
        request.stream = false;
        let builder = self.post(&request);

        Box::pin(async move {
            let response = builder
                .send()
                .await
                .map_err(|e| RelayError::Http(e.to_string()))?;

            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if !status.is_success() {
                return Err(RelayError::Status {
                    status: status.as_u16(),
                    detail: error_detail(&body, status),
                });
            }

            let completion: CompletionBody =
                serde_json::from_str(&body).map_err(|e| RelayError::Http(e.to_string()))?;

            completion
                .content
                .into_iter()
                .map(|block| block.text)
                .find(|text| !text.is_empty())
                .ok_or(RelayError::EmptyResponse)
        })
    }
}

/// Extract the most specific error detail a failed response offers:
/// `error.message`, then `details`, then a bare `error` string, then the
/// status line.
fn error_detail(body: &str, status: StatusCode) -> String {
    let fallback = || {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    };

    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return fallback();
    };

    if let Some(message) = value.pointer("/error/message").and_then(|v| v.as_str()) {
        return message.to_string();
    }
    if let Some(details) = value.get("details").and_then(|v| v.as_str()) {
        return details.to_string();
    }
    if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
        return error.to_string();
    }

    fallback()
}
