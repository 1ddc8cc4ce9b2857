//! Session records.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, PartId, SessionId};
use crate::permission::Ruleset;
use crate::time::now_ms;

/// Where a session was reverted to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertPointer {
    /// First message that was reverted.
    pub message_id: MessageId,
    /// First part within that message, if only part of it was reverted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_id: Option<PartId>,
}

/// Session timestamps (ms).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTime {
    /// Creation time.
    pub created: i64,
    /// Last update.
    pub updated: i64,
}

/// A conversation. Children (subtasks) reference their parent by ID.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session ID.
    pub id: SessionId,
    /// Parent session for subtask sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<SessionId>,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Session-level permission rules, merged after the agent's.
    #[serde(default)]
    pub permission: Ruleset,
    /// Revert pointer, if the session was rewound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert: Option<RevertPointer>,
    /// Provider-native conversation handles, keyed by provider ID.
    #[serde(default)]
    pub provider_session_handles: IndexMap<String, String>,
    /// Timestamps.
    pub time: SessionTime,
}

impl Session {
    /// New root session.
    pub fn new(title: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: SessionId::new(),
            parent_id: None,
            title: title.into(),
            permission: Vec::new(),
            revert: None,
            provider_session_handles: IndexMap::new(),
            time: SessionTime {
                created: now,
                updated: now,
            },
        }
    }

    /// New child session with its own rules.
    pub fn child(parent_id: SessionId, title: impl Into<String>, permission: Ruleset) -> Self {
        let mut session = Self::new(title);
        session.parent_id = Some(parent_id);
        session.permission = permission;
        session
    }

    /// Resumable handle for `provider_id`.
    pub fn provider_handle(&self, provider_id: &str) -> Option<&str> {
        self.provider_session_handles
            .get(provider_id)
            .map(String::as_str)
    }
}
