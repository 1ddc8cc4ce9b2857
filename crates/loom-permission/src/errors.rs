//! Permission error types.

use loom_core::PermissionRequestId;
use thiserror::Error;

/// Errors produced while checking or asking for a permission.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// A rule evaluated to `deny`.
    #[error("permission denied: {permission} on {pattern:?}")]
    Denied {
        /// Permission kind.
        permission: String,
        /// Target that was denied.
        pattern: String,
    },

    /// The decision channel replied `reject` or `always_deny`.
    #[error("permission request {request_id} was rejected")]
    Rejected {
        /// Rejected request.
        request_id: PermissionRequestId,
    },

    /// The turn was cancelled while the request was pending.
    #[error("permission request cancelled")]
    Cancelled,

    /// Persisting an `always` rule failed.
    #[error("failed to persist permission rule: {0}")]
    Persist(String),
}

impl PermissionError {
    /// Every variant except `Persist` means the action must not run.
    pub fn is_denial(&self) -> bool {
        !matches!(self, Self::Persist(_))
    }
}
