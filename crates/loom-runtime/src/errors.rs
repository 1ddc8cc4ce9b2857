//! Runtime error types.

use loom_core::{MessageId, SessionId};
use loom_permission::PermissionError;

/// Errors from the session store collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No such session.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// No such message.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// Backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors that can occur while running turns, compaction, or tasks.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A rule denied the action, or the decision channel rejected it.
    #[error("Permission denied: {0}")]
    PermissionDenied(#[from] PermissionError),

    /// The provider bridge failed.
    #[error("Bridge error: {0}")]
    Bridge(String),

    /// A compaction pass did not produce a summary.
    #[error("Compaction failed: {0}")]
    CompactionFailed(String),

    /// The turn's cancellation token fired.
    #[error("Operation aborted")]
    Aborted,

    /// Session store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Agent not configured.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Caller supplied an unusable request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal / unexpected error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Whether the caller may reasonably retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Bridge(_) | Self::Aborted | Self::CompactionFailed(_) => true,
            Self::Store(StoreError::Backend(_)) => true,
            Self::PermissionDenied(_)
            | Self::Store(_)
            | Self::AgentNotFound(_)
            | Self::InvalidRequest(_)
            | Self::Internal(_) => false,
        }
    }

    /// Short category string for logging and error records.
    pub fn category(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "permission",
            Self::Bridge(_) => "bridge",
            Self::CompactionFailed(_) => "compaction",
            Self::Aborted => "aborted",
            Self::Store(_) => "store",
            Self::AgentNotFound(_) => "agent",
            Self::InvalidRequest(_) => "request",
            Self::Internal(_) => "internal",
        }
    }

    /// Name recorded on a message that ended with this error.
    pub fn error_name(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "PermissionDenied",
            Self::Bridge(_) => "BridgeError",
            Self::CompactionFailed(_) => "CompactionFailure",
            Self::Aborted => "AbortedError",
            Self::Store(_) => "StoreError",
            Self::AgentNotFound(_) | Self::InvalidRequest(_) | Self::Internal(_) => "UnknownError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_error_converts() {
        let err: RuntimeError = PermissionError::Cancelled.into();
        assert_eq!(err.category(), "permission");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn store_errors() {
        let missing: RuntimeError = StoreError::SessionNotFound(SessionId::from("ses_x")).into();
        assert!(!missing.is_recoverable());
        assert_eq!(missing.to_string(), "Store error: session not found: ses_x");

        let backend: RuntimeError = StoreError::Backend("disk".into()).into();
        assert!(backend.is_recoverable());
    }

    #[test]
    fn bridge_error_name() {
        let err = RuntimeError::Bridge("cli exited 1".into());
        assert_eq!(err.error_name(), "BridgeError");
        assert_eq!(err.category(), "bridge");
        assert!(err.is_recoverable());
    }
}
