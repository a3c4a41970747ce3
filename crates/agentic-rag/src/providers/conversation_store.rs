//! Conversation persistence and execution trace traits

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{AgentExecution, Conversation, Message, NewMessage, Outcome, ToolInvocation};

/// Durable conversation storage
///
/// Implementations:
/// - `ConversationDb`: SQLite
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Look up a conversation
    async fn get(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// Create an active conversation with a fresh identity
    async fn create(&self, user_id: Option<String>) -> Result<Conversation>;

    /// Persist a message at the end of the transcript.
    ///
    /// The stored timestamp is strictly later than every earlier message of the
    /// same conversation. Fails with `NotFound` if the conversation is absent.
    async fn append_message(&self, conversation_id: Uuid, message: NewMessage) -> Result<Message>;

    /// Transcript in timestamp order
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    /// Number of messages in a conversation
    async fn count_messages(&self, conversation_id: Uuid) -> Result<u64>;

    /// Delete a conversation with its messages and trace records.
    ///
    /// Returns the number of messages removed.
    async fn delete(&self, id: Uuid) -> Result<u64>;

    /// Check if the store is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Audit log of agent executions and their tool calls
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    /// Open a `pending` execution
    async fn create_execution(
        &self,
        conversation_id: Uuid,
        agent_type: &str,
        input: Value,
    ) -> Result<AgentExecution>;

    /// Move an execution from `pending` to `running`
    async fn mark_running(&self, execution_id: Uuid) -> Result<()>;

    /// Close an execution, recording output or error and elapsed time
    async fn finish_execution(&self, execution_id: Uuid, outcome: Outcome) -> Result<()>;

    /// Open a `pending` tool invocation under an execution
    async fn start_tool(
        &self,
        execution_id: Uuid,
        tool_name: &str,
        input: Value,
    ) -> Result<ToolInvocation>;

    /// Close a tool invocation
    async fn finish_tool(&self, invocation_id: Uuid, outcome: Outcome) -> Result<()>;

    /// Executions of a conversation with their tool calls, oldest first
    async fn list_executions(&self, conversation_id: Uuid) -> Result<Vec<AgentExecution>>;
}
