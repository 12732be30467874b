//! Model runtime boundary.
//!
//! The runtime takes instructions, declared tools and the history so far, and
//! answers with either tool calls to perform or the final reply.

use super::tools::ToolSchema;
use crate::memory::ConversationEntry;
use crate::Result;
use async_trait::async_trait;

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

/// One model step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStep {
    /// Run these tools in order, then ask again
    ToolCalls(Vec<ToolCall>),
    /// Final text for the traveller
    Final(String),
}

#[async_trait]
pub trait ModelRuntime: Send + Sync {
    async fn step(
        &self,
        instructions: &str,
        tools: &[ToolSchema],
        history: &[ConversationEntry],
    ) -> Result<ModelStep>;
}
