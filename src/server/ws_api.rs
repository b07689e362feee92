//! WebSocket surface.
//!
//! `GET /ws/generate/{single,server-and-user,conversation}` upgrades to a
//! one-shot streaming connection: the client sends one JSON request frame,
//! the relay answers with incremental text fragments, then closes normally.
//!
//! `GET /ws/assistant/{single,server-and-user,conversation}` upgrades to a
//! duplex assistant session. The relay drives a remote run and, whenever the
//! run pauses for tool output, sends `callback` frames to the client; the
//! listener task routes the client's `{requestId, result}` frames back to the
//! session's [`CallBroker`] in whatever order they arrive. An explicit
//! `{"type": "close"}` frame, a disconnect, or a session failure all drain
//! the session: every pending tool call is unblocked with a failure before
//! the socket is closed.
//!
//! Closure codes: 1000 on the normal path, 1002 after a malformed first
//! payload.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as WsMessage, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use crate::error::RelayError;
use crate::provider::openai::CompletionEvent;
use crate::relay::correlator::{CallBroker, WsOutbound};
use crate::relay::frames::{
    ControlFrame, InboundFrame, OutboundFrame, CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR,
};
use crate::relay::session::{AssistantSession, SeedConversation};
use crate::server::http_api::AppState;
use crate::server::schemas::{ConversationRequest, ServerAndUserRequest, SingleRequest};

/// Which request schema the first frame must match.
#[derive(Debug, Clone, Copy)]
enum SeedKind {
    Single,
    ServerAndUser,
    Conversation,
}

// ─── Upgrade Handlers ──────────────────────────────────────────────────────

pub async fn generate_single(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_generate_ws(socket, state, SeedKind::Single))
}

pub async fn generate_server_and_user(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_generate_ws(socket, state, SeedKind::ServerAndUser))
}

pub async fn generate_conversation(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_generate_ws(socket, state, SeedKind::Conversation))
}

pub async fn assistant_single(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_assistant_ws(socket, state, SeedKind::Single))
}

pub async fn assistant_server_and_user(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_assistant_ws(socket, state, SeedKind::ServerAndUser))
}

pub async fn assistant_conversation(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_assistant_ws(socket, state, SeedKind::Conversation))
}

// ─── Shared Helpers ────────────────────────────────────────────────────────

/// Wait for the first text frame, ignoring ping/pong.
async fn recv_text(socket: &mut WebSocket) -> Option<String> {
    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(WsMessage::Text(text)) => return Some(text.to_string()),
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

async fn close(socket: &mut WebSocket, code: u16) {
    let _ = socket
        .send(WsMessage::Close(Some(CloseFrame {
            code,
            reason: Utf8Bytes::from_static(""),
        })))
        .await;
}

async fn send_error(socket: &mut WebSocket, err: &RelayError) {
    let _ = socket.send(WsMessage::Text(format!("Error: {err}").into())).await;
}

fn parse_seed(kind: SeedKind, raw: &str) -> Result<(SeedConversation, Option<String>), RelayError> {
    let invalid = |e: serde_json::Error| RelayError::InvalidPayload(e.to_string());
    match kind {
        SeedKind::Single => {
            let req: SingleRequest = serde_json::from_str(raw).map_err(invalid)?;
            Ok((SeedConversation::Single { prompt: req.prompt }, req.assistant_id))
        }
        SeedKind::ServerAndUser => {
            let req: ServerAndUserRequest = serde_json::from_str(raw).map_err(invalid)?;
            Ok((
                SeedConversation::ServerAndUser {
                    server_prompt: req.server_prompt,
                    user_prompt: req.user_prompt,
                },
                req.assistant_id,
            ))
        }
        SeedKind::Conversation => {
            let req: ConversationRequest = serde_json::from_str(raw).map_err(invalid)?;
            Ok((SeedConversation::Conversation { messages: req.messages }, req.assistant_id))
        }
    }
}

// ─── Streaming Generation ──────────────────────────────────────────────────

async fn handle_generate_ws(mut socket: WebSocket, state: Arc<AppState>, kind: SeedKind) {
    let Some(raw) = recv_text(&mut socket).await else {
        info!("Client disconnected before sending a request");
        return;
    };

    let seed = match parse_seed(kind, &raw) {
        Ok((seed, _)) => seed,
        Err(e) => {
            send_error(&mut socket, &e).await;
            close(&mut socket, CLOSE_PROTOCOL_ERROR).await;
            return;
        }
    };

    match state.provider.complete_stream(seed.into_messages()).await {
        Ok(events) => {
            let mut events = ReceiverStream::new(events);
            while let Some(event) = events.next().await {
                match event {
                    CompletionEvent::Delta(text) => {
                        if socket.send(WsMessage::Text(text.into())).await.is_err() {
                            info!("Client disconnected mid-stream");
                            return;
                        }
                    }
                    CompletionEvent::Done => break,
                    CompletionEvent::Error(e) => {
                        error!("Stream failed: {e}");
                        let _ =
                            socket.send(WsMessage::Text(format!("Error: {e}").into())).await;
                        break;
                    }
                }
            }
        }
        Err(e) => {
            error!("Completion request failed: {e}");
            send_error(&mut socket, &e).await;
        }
    }

    close(&mut socket, CLOSE_NORMAL).await;
}

// ─── Assistant Sessions ────────────────────────────────────────────────────

#[derive(Debug)]
enum ListenerExit {
    CloseRequested,
    Disconnected,
}

async fn handle_assistant_ws(mut socket: WebSocket, state: Arc<AppState>, kind: SeedKind) {
    let Some(raw) = recv_text(&mut socket).await else {
        info!("Client disconnected before sending a request");
        return;
    };

    let (seed, assistant_id) = match parse_seed(kind, &raw) {
        Ok((seed, requested)) => {
            match requested.or_else(|| state.config.provider.assistant_id.clone()) {
                Some(id) => (seed, id),
                None => {
                    let e = RelayError::InvalidPayload(
                        "no assistant_id in request and no default configured".to_string(),
                    );
                    send_error(&mut socket, &e).await;
                    close(&mut socket, CLOSE_PROTOCOL_ERROR).await;
                    return;
                }
            }
        }
        Err(e) => {
            send_error(&mut socket, &e).await;
            close(&mut socket, CLOSE_PROTOCOL_ERROR).await;
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<WsOutbound>(32);

    // Writer task: sole owner of the sink. Exits on a Close entry or when
    // every sender is gone.
    let writer = tokio::spawn(async move {
        while let Some(out) = out_rx.recv().await {
            let message = match out {
                WsOutbound::Frame(frame) => {
                    WsMessage::Text(serde_json::to_string(&frame).unwrap_or_default().into())
                }
                WsOutbound::Text(text) => WsMessage::Text(text.into()),
                WsOutbound::Close(code) => {
                    let _ = sink
                        .send(WsMessage::Close(Some(CloseFrame {
                            code,
                            reason: Utf8Bytes::from_static(""),
                        })))
                        .await;
                    return;
                }
            };
            if sink.send(message).await.is_err() {
                return;
            }
        }
    });

    let broker = Arc::new(CallBroker::new(
        out_tx.clone(),
        Duration::from_secs(state.config.session.tool_call_timeout_secs),
    ));

    // Listener task: drains inbound frames for the whole session, routing
    // tool results to the broker. Pairing is by correlation id, so arrival
    // order does not have to match dispatch order.
    let listener_broker = broker.clone();
    let mut listener = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<InboundFrame>(&text) {
                    Ok(InboundFrame::ToolResult { request_id, result }) => {
                        listener_broker.resolve(&request_id, result).await;
                    }
                    Ok(InboundFrame::Control(ControlFrame::Close)) => {
                        return ListenerExit::CloseRequested;
                    }
                    Err(_) => {
                        warn!(frame = %text, "Ignoring unrecognized inbound frame");
                    }
                },
                Ok(WsMessage::Close(_)) | Err(_) => return ListenerExit::Disconnected,
                Ok(_) => {}
            }
        }
        ListenerExit::Disconnected
    });

    let session = AssistantSession::new(state.provider.clone(), state.config.session.clone());

    let outcome = tokio::select! {
        result = session.run(seed, &assistant_id, &broker) => Some(result),
        exit = &mut listener => {
            match exit {
                Ok(ListenerExit::CloseRequested) => info!("Received close command"),
                _ => info!("Client disconnected"),
            }
            None
        }
    };

    // Draining: whatever ended the session, no caller stays suspended.
    broker.fail_all().await;
    listener.abort();

    match outcome {
        Some(Ok(result)) => {
            let _ = out_tx.send(WsOutbound::Frame(OutboundFrame::Result { result })).await;
        }
        Some(Err(e)) => {
            error!("Assistant session failed: {e}");
            let _ = out_tx.send(WsOutbound::Text(format!("Error: {e}"))).await;
        }
        None => {}
    }

    let _ = out_tx.send(WsOutbound::Close(CLOSE_NORMAL)).await;
    drop(out_tx);
    let _ = writer.await;
}
