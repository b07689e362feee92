//! Error taxonomy for the relay.
//!
//! Every failure inside a session is caught at the session boundary and
//! converted into a client-visible text frame; nothing here is allowed to
//! terminate the process.

use thiserror::Error;

use crate::provider::types::RunStatus;

/// Errors surfaced by the provider gateway and the streaming relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed inbound payload. The display string is sent to the client
    /// verbatim (prefixed with "Error: ") before closing with code 1002.
    #[error("Invalid data format. {0}")]
    InvalidPayload(String),

    /// The remote provider rejected or failed a request; carries the
    /// provider's own message. Never retried.
    #[error("provider request failed: {0}")]
    Provider(String),

    /// The remote run reached a terminal failure status.
    #[error("run failed with status: {0}")]
    RunFailed(RunStatus),

    /// The run did not reach a terminal status within the poll budget.
    /// Distinct from `RunFailed`: the remote side reported nothing.
    #[error("run did not complete within {0} poll attempts")]
    RunTimeout(usize),

    /// A dispatched tool call was not resolved within the configured wait.
    #[error("tool call {0} timed out waiting for a client result")]
    ToolCallTimeout(String),

    /// The session was torn down while a tool call was still pending.
    #[error("session closed before tool call completed")]
    SessionClosed,

    /// The client dropped the connection. Logged, never reported back.
    #[error("client disconnected")]
    Disconnected,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Provider(err.to_string())
    }
}
