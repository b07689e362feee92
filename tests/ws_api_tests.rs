//! Integration tests for the WebSocket surface.
//!
//! The router is served on an ephemeral listener and exercised with a real
//! WebSocket client, so close codes and frame ordering are tested end to end.
//! Only paths that never reach the remote provider are driven here.

use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use chat_relay::config::Config;
use chat_relay::provider::openai::OpenAiClient;
use chat_relay::server::http_api::{build_router, AppState};

/// Serve the full router on an ephemeral port and return its ws:// base URL.
async fn serve_router() -> String {
    let config = Arc::new(Config::default());
    let provider = Arc::new(
        OpenAiClient::new("test-key".to_string(), Arc::new(config.provider.clone())).unwrap(),
    );
    let state = Arc::new(AppState {
        provider,
        config,
        start_time: Instant::now(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    format!("ws://{addr}")
}

/// Send one text frame and collect the response frames until the close frame.
async fn send_and_collect(url: &str, payload: &str) -> (Vec<String>, Option<CloseCode>) {
    let (mut socket, _) = connect_async(url).await.unwrap();
    socket.send(Message::Text(payload.into())).await.unwrap();

    let mut texts = Vec::new();
    let mut close_code = None;

    while let Some(msg) = socket.next().await {
        match msg.unwrap() {
            Message::Text(text) => texts.push(text.to_string()),
            Message::Close(frame) => {
                close_code = frame.map(|f| f.code);
                break;
            }
            _ => {}
        }
    }

    (texts, close_code)
}

#[tokio::test]
async fn test_malformed_seed_gets_error_frame_then_protocol_close() {
    let base = serve_router().await;

    let (texts, close_code) =
        send_and_collect(&format!("{base}/ws/generate/conversation"), r#"{"foo": "bar"}"#).await;

    assert_eq!(texts.len(), 1);
    assert!(
        texts[0].starts_with("Error: Invalid data format."),
        "unexpected frame: {}",
        texts[0]
    );
    assert_eq!(close_code, Some(CloseCode::Protocol));
}

#[tokio::test]
async fn test_malformed_assistant_seed_closes_with_protocol_error() {
    let base = serve_router().await;

    let (texts, close_code) =
        send_and_collect(&format!("{base}/ws/assistant/conversation"), r#"{"foo": "bar"}"#).await;

    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("Error: Invalid data format."));
    assert_eq!(close_code, Some(CloseCode::Protocol));
}

#[tokio::test]
async fn test_assistant_without_assistant_id_is_a_validation_failure() {
    // Valid schema, but no assistant_id in the request and none configured.
    let base = serve_router().await;

    let (texts, close_code) =
        send_and_collect(&format!("{base}/ws/assistant/single"), r#"{"prompt": "hi"}"#).await;

    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("Error: Invalid data format."));
    assert_eq!(close_code, Some(CloseCode::Protocol));
}
