//! Assistant session driver: seeds a thread, drives the remote run to a
//! terminal state, and bridges `requires_action` pauses to the client through
//! the session's [`CallBroker`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::RelayError;
use crate::provider::types::{Message, RunStatus, ToolOutput};
use crate::provider::AssistantRuntime;
use crate::relay::correlator::CallBroker;

/// How the seed conversation is constructed. All variants funnel into the
/// same thread-create → message-post → run-drive path.
#[derive(Debug, Clone)]
pub enum SeedConversation {
    /// One user message.
    Single { prompt: String },
    /// System instruction plus one user message.
    ServerAndUser { server_prompt: String, user_prompt: String },
    /// Caller-supplied message list, forwarded in order.
    Conversation { messages: Vec<Message> },
}

impl SeedConversation {
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            SeedConversation::Single { prompt } => vec![Message::user(prompt)],
            SeedConversation::ServerAndUser { server_prompt, user_prompt } => {
                vec![Message::system(server_prompt), Message::user(user_prompt)]
            }
            SeedConversation::Conversation { messages } => messages,
        }
    }
}

/// Drives one assistant run against the provider on behalf of a connection.
pub struct AssistantSession {
    runtime: Arc<dyn AssistantRuntime>,
    settings: SessionConfig,
}

impl AssistantSession {
    pub fn new(runtime: Arc<dyn AssistantRuntime>, settings: SessionConfig) -> Self {
        Self { runtime, settings }
    }

    /// Create a thread, post the seed messages, and drive the run to
    /// completion. Returns the final answer text.
    pub async fn run(
        &self,
        seed: SeedConversation,
        assistant_id: &str,
        broker: &CallBroker,
    ) -> Result<String, RelayError> {
        let thread = self.runtime.create_thread().await?;

        for message in seed.into_messages() {
            self.runtime
                .add_message(&thread.id, message.role, &message.content)
                .await?;
        }

        self.drive_run(&thread.id, assistant_id, broker).await
    }

    /// Poll the run at a fixed interval until it completes, fails, or the
    /// poll budget is exhausted. Tool calls reported via `requires_action`
    /// are dispatched in the order the run lists them; their outputs are
    /// submitted back in one batch before polling resumes.
    async fn drive_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        broker: &CallBroker,
    ) -> Result<String, RelayError> {
        let mut run = self.runtime.create_run(thread_id, assistant_id).await?;
        let interval = Duration::from_millis(self.settings.poll_interval_ms);
        let mut attempts = 0;

        while run.status != RunStatus::Completed {
            if attempts >= self.settings.max_poll_attempts {
                return Err(RelayError::RunTimeout(self.settings.max_poll_attempts));
            }
            attempts += 1;

            tokio::time::sleep(interval).await;
            run = self.runtime.retrieve_run(thread_id, &run.id).await?;

            if run.status.is_terminal_failure() {
                return Err(RelayError::RunFailed(run.status));
            }

            if run.status == RunStatus::RequiresAction {
                let calls = run
                    .required_action
                    .take()
                    .map(|action| action.submit_tool_outputs.tool_calls)
                    .unwrap_or_default();

                debug!(run_id = run.id, calls = calls.len(), "Run requires action");

                let mut outputs = Vec::with_capacity(calls.len());
                for call in calls {
                    let args: Value = serde_json::from_str(&call.function.arguments)?;
                    let result = broker.dispatch(&call.function.name, args).await?;
                    outputs.push(ToolOutput {
                        tool_call_id: call.id,
                        output: render_tool_output(&result),
                    });
                }

                self.runtime
                    .submit_tool_outputs(thread_id, &run.id, outputs)
                    .await?;
            }
        }

        info!(run_id = run.id, polls = attempts, "Run completed");
        self.collect_final_text(thread_id).await
    }

    /// Join the texts of every message created after the seed prompt, in
    /// creation order, one line per message.
    async fn collect_final_text(&self, thread_id: &str) -> Result<String, RelayError> {
        let mut messages = self.runtime.list_messages(thread_id).await?;
        messages.sort_by_key(|message| message.created_at);

        Ok(messages
            .iter()
            .skip(1)
            .map(|message| message.text())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Tool results are untyped JSON; strings go back verbatim, everything else
/// is re-encoded.
fn render_tool_output(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_tool_output_passes_strings_through() {
        assert_eq!(render_tool_output(&json!("plain")), "plain");
        assert_eq!(render_tool_output(&json!({"k": 1})), r#"{"k":1}"#);
        assert_eq!(render_tool_output(&json!(3)), "3");
    }

    #[test]
    fn test_seed_variants_funnel_into_messages() {
        let single = SeedConversation::Single { prompt: "hi".to_string() };
        assert_eq!(single.into_messages().len(), 1);

        let pair = SeedConversation::ServerAndUser {
            server_prompt: "be terse".to_string(),
            user_prompt: "hi".to_string(),
        };
        let messages = pair.into_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "be terse");
    }
}
