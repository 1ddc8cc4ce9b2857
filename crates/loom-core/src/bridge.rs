//! Provider bridge event protocol.
//!
//! A bridge adapts one model provider's execution environment (usually a
//! vendor agent CLI) and emits [`BridgeEvent`]s for a single assistant turn.
//! Ordering rules a bridge must follow:
//!
//! - `tool-start` precedes any `tool-input-delta`/`tool-end` with the same id
//! - one `step-start` before each step's first content event, one `step-end` after its last
//! - `done` at most once
//! - after cancellation, nothing further or a single `error`

use serde::{Deserialize, Serialize};

/// How a file was touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    /// Created.
    Add,
    /// Modified.
    Update,
    /// Removed.
    Delete,
}

/// One changed file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path of the file.
    pub path: String,
    /// Kind of change.
    pub kind: FileChangeKind,
}

/// Event emitted by a provider bridge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum BridgeEvent {
    /// Visible text chunk.
    TextDelta {
        /// Chunk.
        text: String,
    },
    /// Reasoning chunk for reasoning block `id`.
    ReasoningDelta {
        /// Reasoning block id.
        id: String,
        /// Chunk.
        text: String,
    },
    /// A tool call began.
    ToolStart {
        /// Call id.
        id: String,
        /// Tool name.
        tool: String,
        /// Shell command, when the tool is command-like.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },
    /// Partial JSON input for call `id`.
    ToolInputDelta {
        /// Call id.
        id: String,
        /// Raw chunk.
        partial: String,
    },
    /// A tool call finished.
    ToolEnd {
        /// Call id.
        id: String,
        /// Tool output.
        output: String,
        /// Process exit code, when applicable.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
    /// Files changed outside a tool call.
    FileChange {
        /// Change id.
        id: String,
        /// Changed files.
        files: Vec<FileChange>,
    },
    /// A model step began.
    StepStart,
    /// A model step ended.
    StepEnd,
    /// The turn finished.
    Done {
        /// Handle that lets the provider resume this conversation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_session_handle: Option<String>,
    },
    /// The bridge failed.
    Error {
        /// Failure description.
        message: String,
    },
}

impl BridgeEvent {
    /// Wire name of the event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text-delta",
            Self::ReasoningDelta { .. } => "reasoning-delta",
            Self::ToolStart { .. } => "tool-start",
            Self::ToolInputDelta { .. } => "tool-input-delta",
            Self::ToolEnd { .. } => "tool-end",
            Self::FileChange { .. } => "file-change",
            Self::StepStart => "step-start",
            Self::StepEnd => "step-end",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_end_wire_shape() {
        let ev: BridgeEvent = serde_json::from_value(json!({
            "type": "tool-end",
            "id": "1",
            "output": "ok",
            "exitCode": 0
        }))
        .unwrap();
        assert_eq!(
            ev,
            BridgeEvent::ToolEnd {
                id: "1".into(),
                output: "ok".into(),
                exit_code: Some(0)
            }
        );
    }

    #[test]
    fn unit_variants_deserialize() {
        let ev: BridgeEvent = serde_json::from_value(json!({"type": "step-start"})).unwrap();
        assert_eq!(ev, BridgeEvent::StepStart);
        assert_eq!(ev.event_type(), "step-start");
    }

    #[test]
    fn done_handle_is_camel_case() {
        let ev = BridgeEvent::Done {
            provider_session_handle: Some("abc".into()),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["providerSessionHandle"], "abc");
    }

    #[test]
    fn file_change_kinds() {
        let ev: BridgeEvent = serde_json::from_value(json!({
            "type": "file-change",
            "id": "fc1",
            "files": [{"path": "a.rs", "kind": "add"}, {"path": "b.rs", "kind": "delete"}]
        }))
        .unwrap();
        let BridgeEvent::FileChange { files, .. } = ev else {
            panic!("expected file-change");
        };
        assert_eq!(files[1].kind, FileChangeKind::Delete);
    }
}
