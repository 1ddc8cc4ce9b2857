//! Narrow external collaborators: snapshots, summary refresh, and
//! plugin-contributed compaction context.

use async_trait::async_trait;
use loom_core::{MessageId, SessionId};

/// Files changed since a tracked snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Patch {
    /// Snapshot hash the diff was taken against.
    pub hash: String,
    /// Changed paths.
    pub files: Vec<String>,
}

/// Opaque capture of project file state.
#[async_trait]
pub trait Snapshot: Send + Sync {
    /// Capture the current state. `None` when snapshots are unavailable.
    async fn track(&self) -> Option<String>;

    /// Diff the working tree against `hash`.
    async fn patch(&self, hash: &str) -> Patch;
}

/// Snapshot service that never tracks anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSnapshot;

#[async_trait]
impl Snapshot for NoopSnapshot {
    async fn track(&self) -> Option<String> {
        None
    }

    async fn patch(&self, hash: &str) -> Patch {
        Patch {
            hash: hash.to_string(),
            files: Vec::new(),
        }
    }
}

/// Refreshes session/message summaries after a step. Fire-and-forget.
#[async_trait]
pub trait SummaryRefresher: Send + Sync {
    /// Recompute summaries for `message_id` in `session_id`.
    async fn summarize(&self, session_id: &SessionId, message_id: &MessageId);
}

/// Summary refresher that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSummary;

#[async_trait]
impl SummaryRefresher for NoopSummary {
    async fn summarize(&self, _session_id: &SessionId, _message_id: &MessageId) {}
}

/// Plugin hook adding context to compaction prompts.
#[async_trait]
pub trait CompactionContributor: Send + Sync {
    /// Extra context lines for `session_id`.
    async fn context(&self, session_id: &SessionId) -> Vec<String>;
}
