//! Tool pre-approval for one turn.

use std::sync::Arc;

use async_trait::async_trait;
use loom_core::{AgentInfo, PermissionAction, SessionId};
use loom_permission::{AskInput, PermissionService, merge};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bridge::{ToolAuthorizer, ToolDecision};
use crate::store::SessionStore;
use crate::tool_map;

/// [`ToolAuthorizer`] backed by the agent's provider actions and the
/// permission engine.
///
/// Provider actions are a fast path: `allow`/`deny` decide immediately, and
/// anything else is asked against `merge(agent rules, session rules)`.
pub struct TurnAuthorizer {
    permissions: Arc<PermissionService>,
    store: Arc<dyn SessionStore>,
    session_id: SessionId,
    agent: Arc<AgentInfo>,
    provider_id: String,
    cancel: CancellationToken,
}

impl TurnAuthorizer {
    /// Authorizer for `agent` running on `provider_id` in `session_id`.
    pub fn new(
        permissions: Arc<PermissionService>,
        store: Arc<dyn SessionStore>,
        session_id: SessionId,
        agent: Arc<AgentInfo>,
        provider_id: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            permissions,
            store,
            session_id,
            agent,
            provider_id: provider_id.into(),
            cancel,
        }
    }

    fn fast_path(&self, tool: &str) -> Option<ToolDecision> {
        match self.agent.provider_action(&self.provider_id, tool)? {
            PermissionAction::Allow => Some(ToolDecision::Allow),
            PermissionAction::Deny => Some(ToolDecision::Deny {
                reason: format!("Tool \"{tool}\" is denied by agent action policy."),
            }),
            PermissionAction::Ask => None,
        }
    }

    async fn ask(
        &self,
        permission: String,
        patterns: Vec<String>,
        metadata: Map<String, Value>,
    ) -> ToolDecision {
        let session_rules = self
            .store
            .get_session(&self.session_id)
            .await
            .map(|s| s.permission)
            .unwrap_or_default();
        let mut input = AskInput::new(self.session_id.clone(), permission, patterns)
            .with_ruleset(merge(&[&self.agent.permission, &session_rules]))
            .with_always(vec!["*".to_string()])
            .with_agent(self.agent.name.as_str());
        input.metadata = metadata;

        match self.permissions.ask(input, &self.cancel).await {
            Ok(()) => ToolDecision::Allow,
            Err(e) => {
                debug!(session_id = %self.session_id, error = %e, "tool call not authorized");
                ToolDecision::Deny {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn metadata(&self, tool: &str) -> Map<String, Value> {
        let mut metadata = Map::new();
        let _ = metadata.insert("tool".into(), json!(tool));
        let _ = metadata.insert("provider".into(), json!(self.provider_id));
        let _ = metadata.insert("agent".into(), json!(self.agent.name));
        metadata
    }
}

#[async_trait]
impl ToolAuthorizer for TurnAuthorizer {
    async fn authorize_tool(&self, tool: &str, input: &Value) -> ToolDecision {
        if let Some(decision) = self.fast_path(tool) {
            return decision;
        }
        self.ask(
            tool_map::permission_kind(tool),
            vec![tool_map::pattern(tool, input)],
            self.metadata(tool),
        )
        .await
    }

    async fn authorize_command(&self, command: &str) -> ToolDecision {
        const TOOL: &str = "commandExecution";
        if let Some(decision) = self.fast_path(TOOL) {
            return decision;
        }
        let mut metadata = self.metadata(TOOL);
        let _ = metadata.insert("command".into(), json!(command));
        self.ask("bash".into(), vec![command.to_string()], metadata)
            .await
    }

    async fn authorize_file_change(&self, paths: &[String]) -> ToolDecision {
        const TOOL: &str = "fileChange";
        if let Some(decision) = self.fast_path(TOOL) {
            return decision;
        }
        let patterns = if paths.is_empty() {
            vec!["*".to_string()]
        } else {
            paths.to_vec()
        };
        self.ask("edit".into(), patterns, self.metadata(TOOL)).await
    }
}
