//! Provider gateway: the wrapped OpenAI-compatible completion API.

pub mod openai;
pub mod types;

use async_trait::async_trait;

use crate::error::RelayError;
use crate::provider::types::{Role, Run, Thread, ThreadMessage, ToolOutput};

/// The subset of the provider's assistant API a streaming session needs.
///
/// Sessions hold this behind a trait object so tests can script run status
/// transitions without a network.
#[async_trait]
pub trait AssistantRuntime: Send + Sync {
    async fn create_thread(&self) -> Result<Thread, RelayError>;

    async fn add_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ThreadMessage, RelayError>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, RelayError>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, RelayError>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<(), RelayError>;

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, RelayError>;
}
