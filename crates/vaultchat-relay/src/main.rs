use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::any;
use clap::Parser;
use serde_json::json;
use tracing::{error, info};

/// Upstream override, mainly for tests and self-hosted gateways.
const UPSTREAM_ENV: &str = "VAULTCHAT_UPSTREAM_URL";
const DEFAULT_UPSTREAM: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

/// Relay proxy for the model provider.
///
/// Forwards `POST /api/messages` bodies upstream with the caller's
/// credentials, so the API key never travels further than this trust
/// boundary, and relays the response back. The body is streamed, so
/// server-sent events pass through unbuffered.
#[derive(Parser)]
#[command(name = "vaultchat-relay")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8787")]
    listen: String,

    /// Upstream provider endpoint.
    #[arg(long)]
    upstream: Option<String>,
}

#[derive(Clone)]
struct RelayState {
    client: reqwest::Client,
    upstream: String,
}

fn app(state: RelayState) -> Router {
    Router::new()
        .route("/api/messages", any(relay_messages))
        .with_state(state)
}

async fn relay_messages(
    State(state): State<RelayState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(json!({"error": "Method not allowed"})),
        )
            .into_response();
    }

    let Some(api_key) = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing x-api-key header"})),
        )
            .into_response();
    };

    let version = headers
        .get("anthropic-version")
        .and_then(|value| value.to_str().ok())
        .unwrap_or(DEFAULT_ANTHROPIC_VERSION);

    let upstream = state
        .client
        .post(&state.upstream)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-api-key", api_key)
        .header("anthropic-version", version)
        .body(body)
        .send()
        .await;

    match upstream {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("application/json")
                .to_string();

            match Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from_stream(response.bytes_stream()))
            {
                Ok(relayed) => relayed,
                Err(err) => {
                    error!(error = %err, "Failed to assemble relayed response");
                    (
                        StatusCode::BAD_GATEWAY,
                        Json(json!({"error": "Failed to relay upstream response"})),
                    )
                        .into_response()
                }
            }
        }
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": "Failed to reach Anthropic API",
                "details": err.to_string(),
            })),
        )
            .into_response(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let upstream = args
        .upstream
        .or_else(|| std::env::var(UPSTREAM_ENV).ok())
        .unwrap_or_else(|| DEFAULT_UPSTREAM.to_string());

    let state = RelayState {
        client: reqwest::Client::new(),
        upstream: upstream.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!(listen = %args.listen, upstream = %upstream, "Relay listening");

    axum::serve(listener, app(state)).await?;
    Ok(())
}
