//! Agent registry.
//!
//! Resolves [`AgentInfo`] descriptors from settings. Permission rulesets are
//! layered: built-in defaults, then the user's global rules, then per-agent
//! restrictions derived from allowed provider actions, then the agent's own
//! `permission` and `tools` entries.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use loom_core::{
    AgentInfo, AgentMode, ModelRef, PermissionAction, PermissionRule, ProviderActions, Ruleset,
};
use loom_permission::{evaluate, from_config, merge};
use loom_settings::{AgentConfig, LoomSettings, PermissionConfig};
use tracing::warn;

use crate::errors::RuntimeError;
use crate::tool_map::{action_permission_kind, legacy_actions};

/// Provider whose tool names the legacy `tools_allowed` list refers to.
const LEGACY_PROVIDER: &str = "claude-code";

/// Agents that keep the permissive defaults when configured.
const NATIVE: &[&str] = &[
    "builder",
    "planner",
    "general",
    "explore",
    "compaction",
    "title",
    "summary",
];

const COMPACTION_PROMPT: &str = "You are a helpful AI assistant tasked with summarizing \
conversations. Produce a concise summary that keeps what was done, what is in progress, which \
files are involved, and what should happen next.";

const TITLE_PROMPT: &str = "Generate a short title (at most 50 characters) for the \
conversation. Reply with the title only.";

const SUMMARY_PROMPT: &str = "Summarize what was done in this conversation in two or three \
sentences, written as a pull request description.";

const EXPLORE_PROMPT: &str = "You are a fast codebase exploration agent. Find files, search \
code, and answer questions about the repository. Do not modify anything.";

fn defaults() -> Ruleset {
    use PermissionAction::{Allow, Ask, Deny};
    from_config(
        &PermissionConfig::new()
            .action("*", Allow)
            .action("doom_loop", Ask)
            .patterns("external_directory", [("*", Ask)])
            .action("question", Deny)
            .patterns(
                "read",
                [
                    ("*", Allow),
                    ("*.env", Ask),
                    ("*.env.*", Ask),
                    ("*.env.example", Allow),
                ],
            ),
    )
}

fn deny_all() -> Ruleset {
    vec![PermissionRule::new("*", "*", PermissionAction::Deny)]
}

/// Permission kinds enabled by `allow` provider actions, in first-seen order.
fn derived_allows(actions: &ProviderActions) -> Ruleset {
    let kinds: IndexSet<String> = actions
        .values()
        .flat_map(|tools| tools.iter())
        .filter(|(_, action)| **action == PermissionAction::Allow)
        .map(|(tool, _)| action_permission_kind(tool))
        .collect();
    kinds
        .into_iter()
        .map(|kind| PermissionRule::new(kind, "*", PermissionAction::Allow))
        .collect()
}

/// `tools: {name: false}` entries as deny rules.
fn tool_denials(tools: &IndexMap<String, bool>) -> Ruleset {
    tools
        .iter()
        .filter(|(_, enabled)| !**enabled)
        .map(|(tool, _)| {
            let kind = match tool.as_str() {
                "write" | "apply_patch" | "multiedit" => "edit",
                other => other,
            };
            PermissionRule::new(kind, "*", PermissionAction::Deny)
        })
        .collect()
}

fn planner_restrictions(actions: &ProviderActions) -> Ruleset {
    use PermissionAction::{Allow, Ask};
    let extra = from_config(
        &PermissionConfig::new()
            .patterns(
                "read",
                [("*.env", Ask), ("*.env.*", Ask), ("*.env.example", Allow)],
            )
            .patterns("edit", [(".loom/plans/*", Allow)]),
    );
    merge(&[&deny_all(), &derived_allows(actions), &extra])
}

fn hidden_native(name: &str, display: &str, prompt: &str, permission: Ruleset) -> AgentInfo {
    let mut agent = AgentInfo::new(name);
    agent.display_name = Some(display.to_string());
    agent.mode = AgentMode::Primary;
    agent.native = true;
    agent.hidden = true;
    agent.prompt = Some(prompt.to_string());
    agent.permission = permission;
    agent
}

/// Resolved agents keyed by name.
#[derive(Clone, Debug, Default)]
pub struct AgentRegistry {
    agents: IndexMap<String, Arc<AgentInfo>>,
    default_agent: Option<String>,
}

impl AgentRegistry {
    /// Build the registry from settings.
    pub fn from_settings(settings: &LoomSettings) -> Self {
        let defaults = defaults();
        let user = from_config(&settings.permission);
        let locked = merge(&[&defaults, &deny_all(), &user]);

        let mut agents: IndexMap<String, AgentInfo> = IndexMap::new();
        for (name, display, prompt) in [
            ("compaction", "Compaction", COMPACTION_PROMPT),
            ("title", "Title", TITLE_PROMPT),
            ("summary", "Summary", SUMMARY_PROMPT),
        ] {
            let mut agent = hidden_native(name, display, prompt, locked.clone());
            agent.knowledge_base.clone_from(&settings.knowledge_base);
            let _ = agents.insert(name.to_string(), agent);
        }

        for (key, config) in &settings.agent {
            if config.disable {
                let _ = agents.shift_remove(key);
                continue;
            }
            let native = NATIVE.contains(&key.as_str());
            let item = agents.entry(key.clone()).or_insert_with(|| {
                let mut agent = AgentInfo::new(key.as_str());
                agent.mode = if native {
                    AgentMode::Primary
                } else {
                    AgentMode::All
                };
                agent.native = native;
                agent
            });
            apply_config(item, key, config, settings);

            item.permission = if native {
                merge(&[&defaults, &user])
            } else {
                merge(&[
                    &defaults,
                    &user,
                    &deny_all(),
                    &derived_allows(&item.provider_actions),
                ])
            };
            if let Some(permission) = &config.permission {
                item.permission = merge(&[&item.permission, &from_config(permission)]);
            }
            item.permission = merge(&[&item.permission, &tool_denials(&config.tools)]);
            if key == "planner" {
                item.permission = merge(&[
                    &item.permission,
                    &planner_restrictions(&item.provider_actions),
                ]);
            }
        }

        Self {
            agents: agents
                .into_iter()
                .map(|(name, agent)| (name, Arc::new(agent)))
                .collect(),
            default_agent: settings.default_agent.clone(),
        }
    }

    /// Add or replace an agent.
    pub fn insert(&mut self, agent: AgentInfo) {
        let _ = self.agents.insert(agent.name.clone(), Arc::new(agent));
    }

    /// Look up an agent.
    pub fn get(&self, name: &str) -> Result<Arc<AgentInfo>, RuntimeError> {
        self.agents
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::AgentNotFound(name.to_string()))
    }

    /// All agents, default agent first.
    pub fn list(&self) -> Vec<Arc<AgentInfo>> {
        let preferred = self.default_agent.as_deref().unwrap_or("planner");
        let mut list: Vec<Arc<AgentInfo>> = self.agents.values().cloned().collect();
        list.sort_by_key(|a| a.name != preferred);
        list
    }

    /// The agent new sessions start with.
    ///
    /// The configured default when it exists and is visible, else `planner`,
    /// else the first visible agent.
    pub fn default_agent(&self) -> Result<Arc<AgentInfo>, RuntimeError> {
        if let Some(name) = &self.default_agent {
            match self.agents.get(name) {
                Some(agent) if !agent.hidden => return Ok(Arc::clone(agent)),
                Some(_) => warn!(agent = %name, "default agent is hidden, falling back"),
                None => warn!(agent = %name, "default agent not found, falling back"),
            }
        }
        if let Some(planner) = self.agents.get("planner").filter(|a| !a.hidden) {
            return Ok(Arc::clone(planner));
        }
        self.agents
            .values()
            .find(|a| !a.hidden)
            .cloned()
            .ok_or_else(|| RuntimeError::AgentNotFound("no visible agent".into()))
    }

    /// Visible agents a caller with `ruleset` may delegate to.
    pub fn accessible_agents(&self, ruleset: &[PermissionRule]) -> Vec<Arc<AgentInfo>> {
        self.list()
            .into_iter()
            .filter(|a| !a.hidden)
            .filter(|a| evaluate("task", &a.name, ruleset) != PermissionAction::Deny)
            .collect()
    }
}

fn apply_config(item: &mut AgentInfo, key: &str, config: &AgentConfig, settings: &LoomSettings) {
    let mut actions = config.actions.clone();
    if actions.is_none() {
        if let Some(legacy) = &config.tools_allowed {
            warn!(agent = %key, "tools_allowed is deprecated, use actions instead");
            let mut converted = ProviderActions::new();
            let _ = converted.insert(LEGACY_PROVIDER.to_string(), legacy_actions(legacy));
            actions = Some(converted);
        }
    }
    if let Some(tools) = &config.tools_allowed {
        item.tools_allowed.clone_from(tools);
    }

    if key == "explore" && config.prompt.is_none() {
        item.prompt = Some(EXPLORE_PROMPT.to_string());
    }
    if let Some(model) = &config.model {
        match ModelRef::parse(model) {
            Some(parsed) => item.model = Some(parsed),
            None => warn!(agent = %key, model = %model, "ignoring malformed agent model"),
        }
    }
    if config.variant.is_some() {
        item.variant.clone_from(&config.variant);
    }
    if config.prompt.is_some() {
        item.prompt.clone_from(&config.prompt);
    }
    if config.description.is_some() {
        item.description.clone_from(&config.description);
    }
    if let Some(hidden) = config.hidden {
        item.hidden = hidden;
    }
    if config.name.is_some() {
        item.display_name.clone_from(&config.name);
    }
    if let Some(actions) = actions {
        item.provider_actions = actions;
    }
    let knowledge: IndexSet<String> = settings
        .knowledge_base
        .iter()
        .chain(&config.knowledge_base)
        .cloned()
        .collect();
    item.knowledge_base = knowledge.into_iter().collect();
    if let Some(mode) = config.mode {
        item.mode = mode;
    }
}
