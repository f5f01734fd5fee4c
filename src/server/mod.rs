//! HTTP/WebSocket server: incoming-call webhook and the media-stream
//! WebSocket upgrade, wired to a shared [`ServerState`].

pub mod media_stream;
pub mod webhook;

use crate::chat::ChatDriver;
use crate::config::Config;
use crate::conversation::ConversationRegistry;
use crate::voice::{BaseStt, BaseTts};
use anyhow::Result;
use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// State shared across every request handler.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub conversations: Arc<ConversationRegistry>,
    pub stt: Arc<dyn BaseStt>,
    pub tts: Arc<dyn BaseTts>,
    pub chat: Arc<ChatDriver>,
}

/// Build the router and serve it until the process is terminated.
pub async fn start(state: ServerState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port).parse()?;
    let webhook_timeout = Duration::from_secs(state.config.response_timeout_seconds);

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/incoming-call", post(incoming_call_handler))
        .route("/media-stream/{call_id}", get(media_stream::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(webhook_timeout))
        .with_state(state);

    info!(%addr, "voxrelay_listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "healthy",
        "active_calls": state.conversations.count().await,
    }))
}

async fn incoming_call_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Form(params): Form<BTreeMap<String, String>>,
) -> Response {
    if !state.config.webhook_signing_secret.is_empty() {
        let signature = headers
            .get(state.config.webhook_signature_header.as_str())
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let url = format!("{}/incoming-call", state.config.base_url);
        if !webhook::verify_signature(&url, &params, signature, &state.config.webhook_signing_secret) {
            warn!("incoming_call_signature_rejected");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let call_sid = params.get("CallSid").cloned().unwrap_or_default();
    let caller = params.get("From").cloned().unwrap_or_default();
    info!(call_sid = %call_sid, caller = %caller, "incoming_call");

    let xml = webhook::build_stream_response(&state.config.base_url, &call_sid, &caller);
    ([(axum::http::header::CONTENT_TYPE, "application/xml")], xml).into_response()
}
