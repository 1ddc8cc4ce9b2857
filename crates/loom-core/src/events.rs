//! Domain events published for observers (UI, logging, persistence).
//!
//! Events never drive the engine's own control flow.

use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, PermissionRequestId, SessionId};
use crate::message::{Message, MessageError};
use crate::part::Part;
use crate::permission::{PermissionReply, PermissionRequest};

/// Common fields for all events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseEvent {
    /// Session this event belongs to.
    pub session_id: SessionId,
    /// ISO 8601 timestamp.
    pub timestamp: String,
}

impl BaseEvent {
    /// Create a new base event with the current UTC timestamp.
    #[must_use]
    pub fn now(session_id: &SessionId) -> Self {
        Self {
            session_id: session_id.clone(),
            timestamp: crate::time::now_rfc3339(),
        }
    }
}

/// What a busy session is doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPhase {
    /// Reasoning.
    Thinking,
    /// Producing visible text.
    Writing,
    /// Running a tool.
    Tool,
}

/// Coarse session state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionStatus {
    /// No turn running.
    #[default]
    Idle,
    /// A turn is running.
    Busy {
        /// Current phase, if known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase: Option<BusyPhase>,
        /// Short detail, e.g. `Bash: git status`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl SessionStatus {
    /// Busy with no phase.
    pub fn busy() -> Self {
        Self::Busy {
            phase: None,
            detail: None,
        }
    }

    /// Whether a turn is running.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// Runtime event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoomEvent {
    /// A part was created or updated.
    PartUpdated {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Current part value.
        part: Part,
        /// Text appended by this update, for streamed parts.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
    },
    /// A message was created or updated.
    MessageUpdated {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Current message value.
        message: Message,
    },
    /// Session status changed.
    StatusChanged {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// New status.
        status: SessionStatus,
    },
    /// A turn ended in error.
    SessionError {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Message that carries the error.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<MessageId>,
        /// The error.
        error: MessageError,
    },
    /// History was compacted.
    SessionCompacted {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
    },
    /// A permission request is waiting for a reply.
    PermissionAsked {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// The request.
        request: PermissionRequest,
    },
    /// A permission request was answered.
    PermissionReplied {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Request that was answered.
        request_id: PermissionRequestId,
        /// The reply.
        reply: PermissionReply,
    },
    /// A subtask session started.
    TaskStarted {
        /// Base fields (parent session).
        #[serde(flatten)]
        base: BaseEvent,
        /// Child session.
        child_session_id: SessionId,
        /// Target agent.
        agent: String,
        /// Task description.
        description: String,
    },
    /// A subtask session finished.
    TaskCompleted {
        /// Base fields (parent session).
        #[serde(flatten)]
        base: BaseEvent,
        /// Child session.
        child_session_id: SessionId,
    },
    /// The active agent was switched by a handoff.
    AgentSwitched {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Previous agent.
        from: String,
        /// New agent.
        to: String,
    },
}

impl LoomEvent {
    /// Session the event belongs to.
    pub fn session_id(&self) -> &SessionId {
        &self.base().session_id
    }

    /// Base fields.
    pub fn base(&self) -> &BaseEvent {
        match self {
            Self::PartUpdated { base, .. }
            | Self::MessageUpdated { base, .. }
            | Self::StatusChanged { base, .. }
            | Self::SessionError { base, .. }
            | Self::SessionCompacted { base }
            | Self::PermissionAsked { base, .. }
            | Self::PermissionReplied { base, .. }
            | Self::TaskStarted { base, .. }
            | Self::TaskCompleted { base, .. }
            | Self::AgentSwitched { base, .. } => base,
        }
    }

    /// Wire name of the event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PartUpdated { .. } => "part_updated",
            Self::MessageUpdated { .. } => "message_updated",
            Self::StatusChanged { .. } => "status_changed",
            Self::SessionError { .. } => "session_error",
            Self::SessionCompacted { .. } => "session_compacted",
            Self::PermissionAsked { .. } => "permission_asked",
            Self::PermissionReplied { .. } => "permission_replied",
            Self::TaskStarted { .. } => "task_started",
            Self::TaskCompleted { .. } => "task_completed",
            Self::AgentSwitched { .. } => "agent_switched",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compacted_event_shape() {
        let ev = LoomEvent::SessionCompacted {
            base: BaseEvent::now(&SessionId::from("ses_1")),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "session_compacted");
        assert_eq!(v["sessionId"], "ses_1");
        assert!(v["timestamp"].is_string());
        assert_eq!(ev.event_type(), "session_compacted");
    }

    #[test]
    fn status_busy_shape() {
        let status = SessionStatus::Busy {
            phase: Some(BusyPhase::Tool),
            detail: Some("Bash: ls".into()),
        };
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["type"], "busy");
        assert_eq!(v["phase"], "tool");
        assert!(status.is_busy());
        assert!(!SessionStatus::Idle.is_busy());
    }

    #[test]
    fn session_id_accessor() {
        let ev = LoomEvent::AgentSwitched {
            base: BaseEvent::now(&SessionId::from("ses_9")),
            from: "build".into(),
            to: "plan".into(),
        };
        assert_eq!(ev.session_id().as_str(), "ses_9");
    }
}
