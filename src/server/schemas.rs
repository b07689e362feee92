//! Request/response bodies shared by the HTTP and WebSocket endpoints.

use serde::{Deserialize, Serialize};

use crate::provider::types::Message;

/// `{prompt}` — one user message.
#[derive(Debug, Clone, Deserialize)]
pub struct SingleRequest {
    pub prompt: String,
    /// Assistant endpoints only; falls back to the configured default.
    #[serde(default)]
    pub assistant_id: Option<String>,
}

/// `{server_prompt, user_prompt}` — system instruction plus user message.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerAndUserRequest {
    pub server_prompt: String,
    pub user_prompt: String,
    #[serde(default)]
    pub assistant_id: Option<String>,
}

/// `{messages: [{role, content}, ...]}` — caller-supplied conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub assistant_id: Option<String>,
}

/// `{response}` — generated text for the non-streaming endpoints.
#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_request_rejects_unknown_shape() {
        assert!(serde_json::from_str::<ConversationRequest>(r#"{"foo": "bar"}"#).is_err());
    }

    #[test]
    fn test_conversation_request_parses_roles() {
        let req: ConversationRequest = serde_json::from_str(
            r#"{"messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hello"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(req.messages.len(), 2);
        assert!(req.assistant_id.is_none());
    }

    #[test]
    fn test_single_request_optional_assistant_id() {
        let req: SingleRequest =
            serde_json::from_str(r#"{"prompt": "hi", "assistant_id": "asst_1"}"#).unwrap();
        assert_eq!(req.assistant_id.as_deref(), Some("asst_1"));
    }
}
