//! Provider bridge boundary.
//!
//! A [`Bridge`] turns one [`BridgeRequest`] into a [`BridgeEventStream`].
//! The processor is the single reader of that stream. Bridges that expose a
//! pre-approval hook call back through the request's [`ToolAuthorizer`]
//! before letting the vendor runtime execute anything.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use indexmap::IndexMap;
use loom_core::{AgentInfo, BridgeEvent, MessageId, MessageWithParts, ModelRef, SessionId};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Stream of bridge events for one assistant turn.
pub type BridgeEventStream = Pin<Box<dyn Stream<Item = Result<BridgeEvent, BridgeError>> + Send>>;

/// Failures raised by a bridge outside the `error` event.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The turn was cancelled.
    #[error("bridge cancelled")]
    Cancelled,

    /// The bridge could not produce events.
    #[error("bridge failed: {0}")]
    Failed(String),
}

/// Outcome of a tool pre-approval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolDecision {
    /// Let the tool run.
    Allow,
    /// Block the tool.
    Deny {
        /// Reason surfaced to the model.
        reason: String,
    },
}

impl ToolDecision {
    /// Whether the tool may run.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Pre-approval hook a bridge calls before executing a tool.
#[async_trait]
pub trait ToolAuthorizer: Send + Sync {
    /// SDK-style approval for a named tool with its JSON input.
    async fn authorize_tool(&self, tool: &str, input: &Value) -> ToolDecision;

    /// Approval for a shell command.
    async fn authorize_command(&self, command: &str) -> ToolDecision;

    /// Approval for a set of file changes.
    async fn authorize_file_change(&self, paths: &[String]) -> ToolDecision;
}

/// Everything a bridge needs to run one turn.
#[derive(Clone)]
pub struct BridgeRequest {
    /// Session the turn belongs to.
    pub session_id: SessionId,
    /// Assistant message being produced.
    pub message_id: MessageId,
    /// Agent running the turn.
    pub agent: Arc<AgentInfo>,
    /// Provider and model.
    pub model: ModelRef,
    /// System prompt lines.
    pub system: Vec<String>,
    /// History visible to the model.
    pub messages: Vec<MessageWithParts>,
    /// Handle that lets the provider resume its own conversation state.
    pub resume_handle: Option<String>,
    /// Tool enable map (`false` disables a tool).
    pub tools: IndexMap<String, bool>,
    /// Pre-approval hook.
    pub authorizer: Arc<dyn ToolAuthorizer>,
    /// Cancellation for the whole turn.
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for BridgeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRequest")
            .field("session_id", &self.session_id)
            .field("message_id", &self.message_id)
            .field("agent", &self.agent.name)
            .field("model", &self.model)
            .field("messages", &self.messages.len())
            .field("resume_handle", &self.resume_handle)
            .finish_non_exhaustive()
    }
}

/// A model provider adapter.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Start a turn and return its event stream.
    async fn stream(&self, request: BridgeRequest) -> Result<BridgeEventStream, BridgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_helpers() {
        assert!(ToolDecision::Allow.is_allowed());
        assert!(
            !ToolDecision::Deny {
                reason: "no".into()
            }
            .is_allowed()
        );
    }

    #[test]
    fn error_display() {
        assert_eq!(
            BridgeError::Failed("exit 1".into()).to_string(),
            "bridge failed: exit 1"
        );
    }
}
