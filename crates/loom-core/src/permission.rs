//! Permission rule and request types.
//!
//! These are plain data. Evaluation, merging, and the pending-request
//! service live in `loom-permission`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{PermissionRequestId, SessionId};

/// Outcome of evaluating a rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    /// Proceed without asking.
    Allow,
    /// Ask an external decision channel.
    Ask,
    /// Refuse.
    Deny,
}

impl fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Ask => write!(f, "ask"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

/// A single `(permission, pattern) -> action` rule.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Permission kind (e.g. `bash`, `edit`, `task`). May contain wildcards.
    pub permission: String,
    /// Target pattern (e.g. `git *`, `src/*.rs`).
    pub pattern: String,
    /// Action when this rule matches.
    pub action: PermissionAction,
}

impl PermissionRule {
    /// Build a rule.
    pub fn new(
        permission: impl Into<String>,
        pattern: impl Into<String>,
        action: PermissionAction,
    ) -> Self {
        Self {
            permission: permission.into(),
            pattern: pattern.into(),
            action,
        }
    }
}

/// Ordered list of rules. Later rules take precedence.
pub type Ruleset = Vec<PermissionRule>;

/// A request waiting on an external decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    /// Request ID.
    pub id: PermissionRequestId,
    /// Session whose turn is blocked on this request.
    pub session_id: SessionId,
    /// Permission kind being asked for.
    pub permission: String,
    /// Concrete targets of the action.
    pub patterns: Vec<String>,
    /// Free-form context for the decision UI.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Patterns persisted when the reply is `always`/`always_deny`.
    #[serde(default)]
    pub always: Vec<String>,
}

/// Reply from the decision channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionReply {
    /// Allow this call only.
    Once,
    /// Allow and persist an allow rule.
    Always,
    /// Deny and persist a deny rule.
    AlwaysDeny,
    /// Deny this call only.
    Reject,
}
