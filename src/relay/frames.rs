//! JSON frame shapes exchanged over an assistant WebSocket.
//!
//! Inbound (client → relay):
//! - `{"type": "close"}` ends the session.
//! - `{"requestId": "<uuid>", "result": <any>}` resolves a pending tool call.
//!
//! Outbound (relay → client):
//! - `{"type": "callback", "functionName": ..., "functionArgs": {...}, "requestId": "<uuid>"}`
//! - `{"type": "result", "result": "<text>"}`
//!
//! Errors are sent as plain text frames of the form `"Error: <message>"` and
//! are not part of these enums.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured frame received from the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    Control(ControlFrame),
    /// Result for a previously dispatched tool call. `result` is untyped:
    /// whatever the client-side tool produced.
    ToolResult {
        #[serde(rename = "requestId")]
        request_id: String,
        result: Value,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    Close,
}

/// A structured frame sent to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Ask the client to execute a tool and answer with the same request id.
    #[serde(rename_all = "camelCase")]
    Callback {
        function_name: String,
        function_args: Value,
        request_id: String,
    },
    /// Final answer for the session.
    Result { result: String },
}

/// WebSocket close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// WebSocket close code for a protocol error (malformed inbound payload).
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
