//! Runtime dependencies.
//!
//! Every component receives a shared [`RuntimeContext`] instead of reaching
//! for globals. Writes that observers care about go through the helpers
//! here so each one is persisted and published together.

use std::sync::Arc;

use loom_core::{BaseEvent, EventEmitter, LoomEvent, Message, Part};
use loom_permission::{NoopPersister, PermissionService, RulePersister};
use loom_settings::LoomSettings;

use crate::agents::AgentRegistry;
use crate::bridge::Bridge;
use crate::collaborators::{
    CompactionContributor, NoopSnapshot, NoopSummary, Snapshot, SummaryRefresher,
};
use crate::errors::StoreError;
use crate::status::StatusTracker;
use crate::store::SessionStore;

/// Shared collaborators for turns, compaction, and tasks.
#[derive(Clone)]
pub struct RuntimeContext {
    /// Session store.
    pub store: Arc<dyn SessionStore>,
    /// Provider bridge.
    pub bridge: Arc<dyn Bridge>,
    /// Permission engine.
    pub permissions: Arc<PermissionService>,
    /// Domain event channel.
    pub emitter: Arc<EventEmitter>,
    /// Busy/idle tracking.
    pub status: Arc<StatusTracker>,
    /// Project snapshots.
    pub snapshot: Arc<dyn Snapshot>,
    /// Summary refresh side effect.
    pub summary: Arc<dyn SummaryRefresher>,
    /// Compaction context plugins.
    pub contributors: Vec<Arc<dyn CompactionContributor>>,
    /// Resolved agents.
    pub agents: Arc<AgentRegistry>,
    /// Loaded settings.
    pub settings: Arc<LoomSettings>,
}

impl RuntimeContext {
    /// Context with no-op snapshot, summary, and rule persistence.
    pub fn new(
        settings: LoomSettings,
        store: Arc<dyn SessionStore>,
        bridge: Arc<dyn Bridge>,
    ) -> Self {
        let emitter = Arc::new(EventEmitter::new());
        let agents = Arc::new(AgentRegistry::from_settings(&settings));
        Self {
            store,
            bridge,
            permissions: Arc::new(PermissionService::new(
                Arc::new(NoopPersister),
                Arc::clone(&emitter),
            )),
            status: Arc::new(StatusTracker::new(Arc::clone(&emitter))),
            emitter,
            snapshot: Arc::new(NoopSnapshot),
            summary: Arc::new(NoopSummary),
            contributors: Vec::new(),
            agents,
            settings: Arc::new(settings),
        }
    }

    /// Persist `always` replies through `persister`.
    #[must_use]
    pub fn with_persister(mut self, persister: Arc<dyn RulePersister>) -> Self {
        self.permissions = Arc::new(PermissionService::new(persister, Arc::clone(&self.emitter)));
        self
    }

    /// Use `snapshot` for step diffs.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: Arc<dyn Snapshot>) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// Use `summary` for post-step summary refresh.
    #[must_use]
    pub fn with_summary(mut self, summary: Arc<dyn SummaryRefresher>) -> Self {
        self.summary = summary;
        self
    }

    /// Add a compaction context contributor.
    #[must_use]
    pub fn with_contributor(mut self, contributor: Arc<dyn CompactionContributor>) -> Self {
        self.contributors.push(contributor);
        self
    }

    /// Replace the agent registry.
    #[must_use]
    pub fn with_agents(mut self, agents: AgentRegistry) -> Self {
        self.agents = Arc::new(agents);
        self
    }

    /// Upsert `part` and publish it with the text `delta` that changed it.
    pub async fn save_part(&self, part: &Part, delta: Option<&str>) -> Result<(), StoreError> {
        let _ = self.store.update_part(part.clone()).await?;
        let _ = self.emitter.emit(LoomEvent::PartUpdated {
            base: BaseEvent::now(&part.session_id),
            part: part.clone(),
            delta: delta.map(ToString::to_string),
        });
        Ok(())
    }

    /// Insert `message` and publish it.
    pub async fn create_message(&self, message: &Message) -> Result<(), StoreError> {
        let _ = self.store.create_message(message.clone()).await?;
        self.publish_message(message);
        Ok(())
    }

    /// Replace `message` and publish it.
    pub async fn save_message(&self, message: &Message) -> Result<(), StoreError> {
        let _ = self.store.update_message(message.clone()).await?;
        self.publish_message(message);
        Ok(())
    }

    fn publish_message(&self, message: &Message) {
        let _ = self.emitter.emit(LoomEvent::MessageUpdated {
            base: BaseEvent::now(&message.session_id),
            message: message.clone(),
        });
    }
}
