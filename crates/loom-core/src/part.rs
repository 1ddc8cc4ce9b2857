//! Message parts.
//!
//! A [`Part`] is the unit of persisted conversation content. Parts are
//! append-only except the in-progress text, reasoning, and tool parts,
//! which are updated in place until finalized.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{MessageId, PartId, SessionId};
use crate::message::TokenUsage;

/// Start/end timestamps (ms) of a streamed part.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartTime {
    /// First delta.
    pub start: i64,
    /// Finalization time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

impl PartTime {
    /// Open interval starting at `start`.
    pub fn starting(start: i64) -> Self {
        Self { start, end: None }
    }
}

/// Visible assistant or user text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPart {
    /// Accumulated text.
    pub text: String,
    /// Inserted by the runtime rather than typed by a user or model.
    #[serde(default)]
    pub synthetic: bool,
    /// Excluded from history formatting and word counts.
    #[serde(default)]
    pub ignored: bool,
    /// Streaming interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<PartTime>,
}

/// Model reasoning text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningPart {
    /// Accumulated reasoning.
    pub text: String,
    /// Streaming interval.
    pub time: PartTime,
}

/// Timestamps of a tool invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolTime {
    /// When the call started running.
    pub start: i64,
    /// When it reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

/// Lifecycle of a tool call: `pending -> running -> completed | error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolState {
    /// Announced, not yet running.
    Pending {
        /// Input known so far.
        input: Value,
    },
    /// Executing in the bridge.
    Running {
        /// Input known so far.
        input: Value,
        /// Display title.
        title: String,
        /// Raw accumulated input and other bookkeeping.
        metadata: Map<String, Value>,
        /// Timing.
        time: ToolTime,
    },
    /// Finished successfully.
    Completed {
        /// Final input.
        input: Value,
        /// Tool output.
        output: String,
        /// Display title.
        title: String,
        /// Exit metadata.
        metadata: Map<String, Value>,
        /// Timing.
        time: ToolTime,
    },
    /// Failed or aborted.
    Error {
        /// Input at failure time.
        input: Value,
        /// Failure description.
        error: String,
        /// Timing.
        time: ToolTime,
    },
}

impl ToolState {
    /// Whether the call reached `completed` or `error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }

    /// Input recorded in any state.
    pub fn input(&self) -> &Value {
        match self {
            Self::Pending { input }
            | Self::Running { input, .. }
            | Self::Completed { input, .. }
            | Self::Error { input, .. } => input,
        }
    }

    /// Start time, if the call ever ran.
    pub fn start(&self) -> Option<i64> {
        match self {
            Self::Pending { .. } => None,
            Self::Running { time, .. } | Self::Completed { time, .. } | Self::Error { time, .. } => {
                Some(time.start)
            }
        }
    }
}

/// A tool call part.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPart {
    /// Bridge-assigned correlation id.
    #[serde(rename = "callID")]
    pub call_id: String,
    /// Tool name as reported by the bridge.
    pub tool: String,
    /// Current state.
    pub state: ToolState,
}

/// Marks the start of a model step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStartPart {
    /// Snapshot hash taken before the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

/// Marks the end of a model step with its accounting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepFinishPart {
    /// Finish reason.
    pub reason: String,
    /// Snapshot hash taken after the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
    /// Token accounting.
    pub tokens: TokenUsage,
    /// Cost in USD.
    pub cost: f64,
}

/// Files changed during a step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchPart {
    /// Content hash or bridge change id.
    pub hash: String,
    /// Changed paths.
    pub files: Vec<String>,
}

/// Marks a user message as a compaction request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionPart {
    /// Triggered automatically rather than by the user.
    pub auto: bool,
}

/// Part payload, keyed by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PartKind {
    /// Text.
    Text(TextPart),
    /// Reasoning.
    Reasoning(ReasoningPart),
    /// Tool call.
    Tool(ToolPart),
    /// Step start.
    StepStart(StepStartPart),
    /// Step finish.
    StepFinish(StepFinishPart),
    /// File patch.
    Patch(PatchPart),
    /// Compaction request.
    Compaction(CompactionPart),
}

/// A persisted part.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Part ID (ascending within a message).
    pub id: PartId,
    /// Owning session.
    pub session_id: SessionId,
    /// Owning message.
    pub message_id: MessageId,
    /// Payload.
    #[serde(flatten)]
    pub kind: PartKind,
}

impl Part {
    /// New part with a fresh ascending ID.
    pub fn new(session_id: SessionId, message_id: MessageId, kind: PartKind) -> Self {
        Self {
            id: PartId::new(),
            session_id,
            message_id,
            kind,
        }
    }

    /// Plain text part.
    pub fn text(session_id: SessionId, message_id: MessageId, text: impl Into<String>) -> Self {
        Self::new(
            session_id,
            message_id,
            PartKind::Text(TextPart {
                text: text.into(),
                ..TextPart::default()
            }),
        )
    }

    /// Synthetic text part.
    pub fn synthetic_text(
        session_id: SessionId,
        message_id: MessageId,
        text: impl Into<String>,
    ) -> Self {
        Self::new(
            session_id,
            message_id,
            PartKind::Text(TextPart {
                text: text.into(),
                synthetic: true,
                ..TextPart::default()
            }),
        )
    }

    /// Text payload, if this is a text part.
    pub fn as_text(&self) -> Option<&TextPart> {
        match &self.kind {
            PartKind::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Tool payload, if this is a tool part.
    pub fn as_tool(&self) -> Option<&ToolPart> {
        match &self.kind {
            PartKind::Tool(t) => Some(t),
            _ => None,
        }
    }

    /// Mutable tool payload.
    pub fn as_tool_mut(&mut self) -> Option<&mut ToolPart> {
        match &mut self.kind {
            PartKind::Tool(t) => Some(t),
            _ => None,
        }
    }

    /// Wire name of the part type.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            PartKind::Text(_) => "text",
            PartKind::Reasoning(_) => "reasoning",
            PartKind::Tool(_) => "tool",
            PartKind::StepStart(_) => "step-start",
            PartKind::StepFinish(_) => "step-finish",
            PartKind::Patch(_) => "patch",
            PartKind::Compaction(_) => "compaction",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids() -> (SessionId, MessageId) {
        (SessionId::from("ses_1"), MessageId::from("msg_1"))
    }

    #[test]
    fn text_part_wire_shape() {
        let (s, m) = ids();
        let part = Part::text(s, m, "hi");
        let v = serde_json::to_value(&part).unwrap();
        assert_eq!(v["type"], "text");
        assert_eq!(v["text"], "hi");
        assert_eq!(v["sessionId"], "ses_1");
        assert_eq!(v["messageId"], "msg_1");
        assert_eq!(part.type_name(), "text");
    }

    #[test]
    fn tool_part_roundtrip_keeps_state() {
        let (s, m) = ids();
        let part = Part::new(
            s,
            m,
            PartKind::Tool(ToolPart {
                call_id: "call_1".into(),
                tool: "Bash".into(),
                state: ToolState::Error {
                    input: json!({"command": "ls"}),
                    error: "Tool execution aborted".into(),
                    time: ToolTime { start: 1, end: Some(2) },
                },
            }),
        );
        let v = serde_json::to_value(&part).unwrap();
        assert_eq!(v["type"], "tool");
        assert_eq!(v["callID"], "call_1");
        assert_eq!(v["state"]["status"], "error");

        let back: Part = serde_json::from_value(v).unwrap();
        assert_eq!(back, part);
        assert!(back.as_tool().unwrap().state.is_terminal());
    }

    #[test]
    fn step_finish_is_kebab_case() {
        let (s, m) = ids();
        let part = Part::new(s, m, PartKind::StepFinish(StepFinishPart::default()));
        let v = serde_json::to_value(&part).unwrap();
        assert_eq!(v["type"], "step-finish");
    }

    #[test]
    fn tool_state_helpers() {
        let pending = ToolState::Pending { input: json!({}) };
        assert!(!pending.is_terminal());
        assert_eq!(pending.start(), None);

        let running = ToolState::Running {
            input: json!({"command": "ls"}),
            title: "ls".into(),
            metadata: Map::new(),
            time: ToolTime { start: 5, end: None },
        };
        assert_eq!(running.start(), Some(5));
        assert_eq!(running.input()["command"], "ls");
    }
}
