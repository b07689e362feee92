//! OpenAI API client: chat completions plus the assistant-run subset.
//!
//! One reqwest client serves both families. Errors from the remote service
//! propagate as [`RelayError::Provider`] carrying the provider's message; no
//! retry is performed anywhere.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::RelayError;
use crate::provider::types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, Message, MessageList,
    ProviderErrorBody, Role, Run, Thread, ThreadMessage, ToolOutput,
};
use crate::provider::AssistantRuntime;

/// An incremental completion event, delivered over a channel.
///
/// The stream is finite and not restartable: a new call starts a new remote
/// computation.
#[derive(Debug, Clone)]
pub enum CompletionEvent {
    /// A new text fragment was generated.
    Delta(String),
    /// Generation is complete.
    Done,
    /// An error occurred mid-stream.
    Error(String),
}

/// Client for an OpenAI-compatible provider.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    config: Arc<ProviderConfig>,
}

impl OpenAiClient {
    pub fn new(api_key: String, config: Arc<ProviderConfig>) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, api_key, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// POST a JSON body and deserialize the response, mapping non-2xx
    /// responses to a provider failure with the provider's own message.
    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, RelayError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .json(&body)
            .send()
            .await?;
        Self::read_response(response).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, RelayError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await?;
        Self::read_response(response).await
    }

    async fn read_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RelayError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            Err(RelayError::Provider(format!("{status}: {message}")))
        }
    }

    /// Run one completion and return the full generated text.
    pub async fn complete(&self, messages: Vec<Message>) -> Result<String, RelayError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let response: ChatCompletionResponse =
            self.post_json("chat/completions", serde_json::to_value(&request)?).await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| RelayError::Provider("completion returned no choices".to_string()))
    }

    /// Run one completion, streaming text fragments to the returned receiver.
    ///
    /// Parses the provider's SSE framing (`data: {...}` lines terminated by
    /// `data: [DONE]`) in a background task and forwards each non-empty delta.
    pub async fn complete_stream(
        &self,
        messages: Vec<Message>,
    ) -> Result<mpsc::Receiver<CompletionEvent>, RelayError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        let response = self
            .http
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(RelayError::Provider(format!("{status}: {message}")));
        }

        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(CompletionEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        let _ = tx.send(CompletionEvent::Done).await;
                        return;
                    }

                    match serde_json::from_str::<ChatCompletionChunk>(data) {
                        Ok(parsed) => {
                            let delta = parsed
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|choice| choice.delta.content);
                            if let Some(text) = delta {
                                if !text.is_empty()
                                    && tx.send(CompletionEvent::Delta(text)).await.is_err()
                                {
                                    // Receiver dropped, stop streaming.
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(line = %data, "Unparseable stream chunk: {e}");
                        }
                    }
                }
            }

            // Stream ended without the [DONE] sentinel; still finite.
            let _ = tx.send(CompletionEvent::Done).await;
        });

        Ok(rx)
    }
}

#[async_trait]
impl AssistantRuntime for OpenAiClient {
    async fn create_thread(&self) -> Result<Thread, RelayError> {
        let thread: Thread = self.post_json("threads", json!({})).await?;
        debug!(thread_id = thread.id, "Thread created");
        Ok(thread)
    }

    async fn add_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ThreadMessage, RelayError> {
        self.post_json(
            &format!("threads/{thread_id}/messages"),
            json!({ "role": role, "content": content }),
        )
        .await
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, RelayError> {
        let run: Run = self
            .post_json(
                &format!("threads/{thread_id}/runs"),
                json!({ "assistant_id": assistant_id }),
            )
            .await?;
        debug!(run_id = run.id, status = %run.status, "Run created");
        Ok(run)
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, RelayError> {
        self.get_json(&format!("threads/{thread_id}/runs/{run_id}")).await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<(), RelayError> {
        let _: Run = self
            .post_json(
                &format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
                json!({ "tool_outputs": outputs }),
            )
            .await?;
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, RelayError> {
        let list: MessageList = self.get_json(&format!("threads/{thread_id}/messages")).await?;
        Ok(list.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt as _;
    use tokio_stream::wrappers::ReceiverStream;

    #[tokio::test]
    async fn test_completion_events_drain_as_a_stream() {
        // The ws delta loop consumes the receiver through ReceiverStream;
        // events must come out in send order and end with Done.
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            tx.send(CompletionEvent::Delta("hel".to_string())).await.unwrap();
            tx.send(CompletionEvent::Delta("lo".to_string())).await.unwrap();
            tx.send(CompletionEvent::Done).await.unwrap();
        });

        let events: Vec<CompletionEvent> = ReceiverStream::new(rx).collect().await;
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], CompletionEvent::Delta(t) if t == "hel"));
        assert!(matches!(&events[1], CompletionEvent::Delta(t) if t == "lo"));
        assert!(matches!(events[2], CompletionEvent::Done));
    }
}
