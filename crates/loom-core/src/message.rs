//! Message records.

use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, SessionId};
use crate::part::Part;
use crate::time::now_ms;

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human (or synthetic) input.
    User,
    /// Model output.
    Assistant,
}

/// Provider + model pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRef {
    /// Provider identifier (e.g. `claude-code`, `codex`).
    pub provider_id: String,
    /// Model identifier within the provider.
    pub model_id: String,
}

impl ModelRef {
    /// Build a model reference.
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }

    /// Parse `provider/model`. The model part may itself contain `/`.
    pub fn parse(s: &str) -> Option<Self> {
        let (provider, model) = s.split_once('/')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self::new(provider, model))
    }
}

/// Creation / completion timestamps (ms).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTime {
    /// When the message was created.
    pub created: i64,
    /// When the turn that produced the message finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<i64>,
}

/// Prompt cache token counts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheUsage {
    /// Tokens read from cache.
    pub read: u64,
    /// Tokens written to cache.
    pub write: u64,
}

/// Token accounting for a message or step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens.
    pub input: u64,
    /// Output tokens.
    pub output: u64,
    /// Reasoning tokens.
    pub reasoning: u64,
    /// Cache usage.
    pub cache: CacheUsage,
}

/// Error recorded on an assistant message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageError {
    /// Error class (e.g. `BridgeError`).
    pub name: String,
    /// Human-readable description.
    pub message: String,
}

impl MessageError {
    /// Build an error record.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A user or assistant message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message ID (ascending within a session).
    pub id: MessageId,
    /// Owning session.
    pub session_id: SessionId,
    /// Author.
    pub role: Role,
    /// For assistant messages: the user message being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,
    /// Agent that handled (or will handle) the message.
    pub agent: String,
    /// Model used.
    pub model: ModelRef,
    /// Model variant, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Timestamps.
    pub time: MessageTime,
    /// Token accounting.
    #[serde(default)]
    pub tokens: TokenUsage,
    /// Cost in USD.
    #[serde(default)]
    pub cost: f64,
    /// Finish reason of the last step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<String>,
    /// Error that ended the turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MessageError>,
    /// Whether this assistant message is a compaction summary.
    #[serde(default)]
    pub summary: bool,
}

impl Message {
    fn base(session_id: SessionId, role: Role, agent: &str, model: ModelRef) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            role,
            parent_id: None,
            agent: agent.to_owned(),
            model,
            variant: None,
            time: MessageTime {
                created: now_ms(),
                completed: None,
            },
            tokens: TokenUsage::default(),
            cost: 0.0,
            finish: None,
            error: None,
            summary: false,
        }
    }

    /// New user message.
    pub fn user(session_id: SessionId, agent: &str, model: ModelRef) -> Self {
        Self::base(session_id, Role::User, agent, model)
    }

    /// New assistant message answering `parent_id`.
    pub fn assistant(
        session_id: SessionId,
        parent_id: MessageId,
        agent: &str,
        model: ModelRef,
    ) -> Self {
        let mut msg = Self::base(session_id, Role::Assistant, agent, model);
        msg.parent_id = Some(parent_id);
        msg
    }

    /// Whether this is a user message.
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Whether this is an assistant message.
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// A message together with its parts, in part-ID order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageWithParts {
    /// Message record.
    pub info: Message,
    /// Parts, ascending by ID.
    pub parts: Vec<Part>,
}
