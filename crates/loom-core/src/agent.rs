//! Agent descriptors.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::message::ModelRef;
use crate::permission::{PermissionAction, Ruleset};

/// Where an agent can be selected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Only as the session's active agent.
    Primary,
    /// As the active agent or as a subtask target.
    #[default]
    All,
}

/// Per-provider tool policy: `provider -> tool -> action`.
pub type ProviderActions = IndexMap<String, IndexMap<String, PermissionAction>>;

/// Resolved agent configuration. Immutable for the duration of a turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    /// Agent key.
    pub name: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Short description shown to delegating agents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Selection mode.
    #[serde(default)]
    pub mode: AgentMode,
    /// Built in rather than user-defined.
    #[serde(default)]
    pub native: bool,
    /// Hidden from pickers and delegation.
    #[serde(default)]
    pub hidden: bool,
    /// Pinned model, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
    /// Model variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// System prompt override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Agent ruleset.
    #[serde(default)]
    pub permission: Ruleset,
    /// Legacy tool allow-list.
    #[serde(default)]
    pub tools_allowed: Vec<String>,
    /// Knowledge-base entries injected into the system prompt.
    #[serde(default)]
    pub knowledge_base: Vec<String>,
    /// Provider pre-approval policy.
    #[serde(default)]
    pub provider_actions: ProviderActions,
}

impl AgentInfo {
    /// Minimal agent with no rules.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: None,
            mode: AgentMode::All,
            native: false,
            hidden: false,
            model: None,
            variant: None,
            prompt: None,
            permission: Vec::new(),
            tools_allowed: Vec::new(),
            knowledge_base: Vec::new(),
            provider_actions: IndexMap::new(),
        }
    }

    /// Configured action for `tool` under `provider_id`.
    pub fn provider_action(&self, provider_id: &str, tool: &str) -> Option<PermissionAction> {
        self.provider_actions
            .get(provider_id)
            .and_then(|tools| tools.get(tool))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_action_lookup() {
        let mut agent = AgentInfo::new("builder");
        let mut tools = IndexMap::new();
        let _ = tools.insert("Bash".to_string(), PermissionAction::Allow);
        let _ = agent
            .provider_actions
            .insert("claude-code".to_string(), tools);

        assert_eq!(
            agent.provider_action("claude-code", "Bash"),
            Some(PermissionAction::Allow)
        );
        assert_eq!(agent.provider_action("claude-code", "Read"), None);
        assert_eq!(agent.provider_action("codex", "Bash"), None);
    }
}
