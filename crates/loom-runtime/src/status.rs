//! Per-session busy/idle status.

use std::sync::Arc;

use dashmap::DashMap;
use loom_core::{BaseEvent, BusyPhase, EventEmitter, LoomEvent, SessionId, SessionStatus};
use tracing::trace;

/// Tracks [`SessionStatus`] per session and publishes changes.
///
/// `StatusChanged` is emitted only when the stored status actually changes,
/// so repeated deltas in the same phase stay silent.
pub struct StatusTracker {
    statuses: DashMap<SessionId, SessionStatus>,
    emitter: Arc<EventEmitter>,
}

/// Longest tool detail shown before truncation.
const DETAIL_MAX_CHARS: usize = 40;

/// `"<tool>: <command>"`, with the command cut to 40 characters plus `…`.
pub fn tool_detail(tool: &str, command: Option<&str>) -> String {
    let Some(command) = command.filter(|c| !c.is_empty()) else {
        return tool.to_string();
    };
    if command.chars().count() > DETAIL_MAX_CHARS {
        let cut: String = command.chars().take(DETAIL_MAX_CHARS).collect();
        format!("{tool}: {cut}…")
    } else {
        format!("{tool}: {command}")
    }
}

impl StatusTracker {
    /// Create a tracker publishing on `emitter`.
    pub fn new(emitter: Arc<EventEmitter>) -> Self {
        Self {
            statuses: DashMap::new(),
            emitter,
        }
    }

    /// Current status (idle when unknown).
    pub fn get(&self, session_id: &SessionId) -> SessionStatus {
        self.statuses
            .get(session_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Store `status`, publishing it if it differs from the current one.
    pub fn set(&self, session_id: &SessionId, status: SessionStatus) {
        let changed = {
            let mut entry = self.statuses.entry(session_id.clone()).or_default();
            if *entry == status {
                false
            } else {
                *entry = status.clone();
                true
            }
        };
        if !changed {
            return;
        }
        trace!(session_id = %session_id, ?status, "session status changed");
        if status == SessionStatus::Idle {
            let _ = self.statuses.remove(session_id);
        }
        let _ = self.emitter.emit(LoomEvent::StatusChanged {
            base: BaseEvent::now(session_id),
            status,
        });
    }

    /// Busy with no phase. Used at turn and step starts.
    pub fn busy(&self, session_id: &SessionId) {
        self.set(session_id, SessionStatus::busy());
    }

    /// Busy in `phase` with optional `detail`.
    pub fn phase(&self, session_id: &SessionId, phase: BusyPhase, detail: Option<String>) {
        self.set(
            session_id,
            SessionStatus::Busy {
                phase: Some(phase),
                detail,
            },
        );
    }

    /// Back to idle.
    pub fn idle(&self, session_id: &SessionId) {
        self.set(session_id, SessionStatus::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn detail_truncates_long_commands() {
        assert_eq!(tool_detail("Bash", Some("ls")), "Bash: ls");
        assert_eq!(tool_detail("Read", None), "Read");
        let long = "a".repeat(50);
        let detail = tool_detail("Bash", Some(&long));
        assert_eq!(detail, format!("Bash: {}…", "a".repeat(40)));
    }

    #[tokio::test]
    async fn only_changes_are_published() {
        let emitter = Arc::new(EventEmitter::new());
        let mut rx = emitter.subscribe();
        let tracker = StatusTracker::new(Arc::clone(&emitter));
        let id = SessionId::new();

        tracker.busy(&id);
        tracker.phase(&id, BusyPhase::Writing, None);
        tracker.phase(&id, BusyPhase::Writing, None);
        tracker.idle(&id);
        tracker.idle(&id);

        let mut seen = Vec::new();
        while let Ok(LoomEvent::StatusChanged { status, .. }) = rx.try_recv() {
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![
                SessionStatus::busy(),
                SessionStatus::Busy {
                    phase: Some(BusyPhase::Writing),
                    detail: None
                },
                SessionStatus::Idle,
            ]
        );
        assert_eq!(tracker.get(&id), SessionStatus::Idle);
    }

    proptest! {
        #[test]
        fn detail_is_bounded(tool in "[A-Za-z]{1,12}", command in "\\PC{0,120}") {
            let detail = tool_detail(&tool, Some(&command));
            let limit = tool.chars().count() + 2 + DETAIL_MAX_CHARS + 1;
            prop_assert!(detail.chars().count() <= limit);
            prop_assert!(detail.starts_with(&tool));
        }
    }
}
