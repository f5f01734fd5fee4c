//! Wire codec and WebSocket handler for the carrier media-stream channel.
//!
//! Inbound frames arrive tagged by an `event` field (`connected`/`start`/
//! `media`/`mark`/`stop`); outbound frames mirror the same shape
//! (`media`/`mark`/`clear`), both carrying the carrier's `streamSid`. This
//! module only translates wire JSON to/from [`Session`] calls — none of
//! the session logic lives here.

use crate::orchestrator::{OutboundEvent, Session};
use crate::server::ServerState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum InboundEvent {
    Connected,
    Start { start: StartPayload },
    Media { media: MediaPayload },
    Mark { mark: MarkPayload },
    Stop,
}

#[derive(Debug, Deserialize)]
struct StartPayload {
    #[serde(rename = "streamSid")]
    stream_sid: String,
    #[serde(rename = "customParameters", default)]
    custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    payload: String,
}

#[derive(Debug, Deserialize)]
struct MarkPayload {
    name: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(call_id): Path<String>,
    State(state): State<ServerState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, call_id, state))
}

async fn handle_socket(socket: WebSocket, call_id: String, state: ServerState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundEvent>(64);
    let stream_sid: Arc<RwLock<Option<String>>> = Arc::new(RwLock::new(None));

    let sender_stream_sid = stream_sid.clone();
    let sender_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let Some(sid) = sender_stream_sid.read().await.clone() else { continue };
            let wire = match event {
                OutboundEvent::Media { payload_b64 } => {
                    json!({"event": "media", "streamSid": sid, "media": {"payload": payload_b64}})
                }
                OutboundEvent::Mark { name } => {
                    json!({"event": "mark", "streamSid": sid, "mark": {"name": name}})
                }
                OutboundEvent::Clear => json!({"event": "clear", "streamSid": sid}),
            };
            if ws_tx.send(Message::Text(wire.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    let mut session: Option<Session> = None;

    while let Some(Ok(msg)) = ws_rx.next().await {
        let Message::Text(text) = msg else { continue };
        let inbound = match serde_json::from_str::<InboundEvent>(&text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(call_sid = %call_id, error = %e, "media_stream_decode_failed");
                continue;
            }
        };

        match inbound {
            InboundEvent::Connected => {
                info!(call_sid = %call_id, "media_stream_connected");
            }
            InboundEvent::Start { start } => {
                *stream_sid.write().await = Some(start.stream_sid.clone());
                let caller = start.custom_parameters.get("caller").cloned().unwrap_or_default();
                info!(call_sid = %call_id, caller = %caller, "media_stream_start");

                let conversation =
                    state.conversations.get_or_create(&call_id, &caller, state.config.max_turns).await;
                let mut new_session = Session::new(
                    call_id.clone(),
                    caller,
                    state.config.clone(),
                    state.stt.clone(),
                    state.tts.clone(),
                    state.chat.clone(),
                    conversation,
                    outbound_tx.clone(),
                );
                new_session.greet().await;
                session = Some(new_session);
            }
            InboundEvent::Media { media } => {
                let Some(session) = session.as_mut() else { continue };
                match BASE64.decode(&media.payload) {
                    Ok(frame) => session.handle_media(&frame).await,
                    Err(e) => warn!(call_sid = %call_id, error = %e, "media_payload_decode_failed"),
                }
            }
            InboundEvent::Mark { mark } => {
                if let Some(session) = session.as_mut() {
                    session.handle_mark(&mark.name).await;
                }
            }
            InboundEvent::Stop => {
                info!(call_sid = %call_id, "media_stream_stop");
                break;
            }
        }
    }

    if let Some(mut session) = session {
        session.handle_stop().await;
    }
    state.conversations.remove(&call_id).await;
    drop(outbound_tx);
    let _ = sender_task.await;
}
