//! Per-agent settings.

use indexmap::IndexMap;
use loom_core::{AgentMode, PermissionAction, ProviderActions};
use serde::{Deserialize, Serialize};

use super::permission::PermissionConfig;

/// One agent entry under `agent.<key>`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Short description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Pinned model as `provider/model`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Model variant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// System prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Selection mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<AgentMode>,
    /// Hide from pickers and delegation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    /// Remove the agent entirely.
    pub disable: bool,
    /// Extra permission rules, applied after derived ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<PermissionConfig>,
    /// Tool switches; `false` denies the tool's permission kind.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub tools: IndexMap<String, bool>,
    /// Provider pre-approval policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<ProviderActions>,
    /// Deprecated tool allow-list, converted to `actions` when those are absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_allowed: Option<Vec<String>>,
    /// Extra knowledge-base entries.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub knowledge_base: Vec<String>,
}

fn actions(entries: &[(&str, &[&str])]) -> ProviderActions {
    entries
        .iter()
        .map(|(provider, tools)| {
            let tools = tools
                .iter()
                .map(|t| ((*t).to_string(), PermissionAction::Allow))
                .collect();
            ((*provider).to_string(), tools)
        })
        .collect()
}

/// Built-in agent entries.
pub fn default_agents() -> IndexMap<String, AgentConfig> {
    let builder = AgentConfig {
        name: Some("Builder".into()),
        description: Some(
            "The default agent. Executes tools based on configured permissions.".into(),
        ),
        actions: Some(actions(&[
            (
                "claude-code",
                &[
                    "Bash",
                    "Read",
                    "Edit",
                    "Write",
                    "MultiEdit",
                    "NotebookEdit",
                    "Glob",
                    "Grep",
                    "WebFetch",
                    "WebSearch",
                    "Task",
                    "TodoWrite",
                    "AskUserQuestion",
                ],
            ),
            ("codex", &["commandExecution", "fileChange"]),
        ])),
        ..AgentConfig::default()
    };

    let planner = AgentConfig {
        name: Some("Planner".into()),
        description: Some("Planning agent. Disallows all edit tools.".into()),
        actions: Some(actions(&[(
            "claude-code",
            &[
                "Read",
                "Glob",
                "Grep",
                "WebFetch",
                "WebSearch",
                "Task",
                "AskUserQuestion",
            ],
        )])),
        ..AgentConfig::default()
    };

    let mut agents = IndexMap::new();
    let _ = agents.insert("builder".to_string(), builder);
    let _ = agents.insert("planner".to_string(), planner);
    agents
}
