//! Settings type tree.

mod agent;
mod compaction;
mod permission;

pub use agent::{AgentConfig, default_agents};
pub use compaction::{CompactionSettings, DEFAULT_COMPACTION_PROMPT};
pub use permission::{PermissionConfig, PermissionValue};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Experimental switches.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentalSettings {
    /// Tools only primary agents may use; subtask sessions get them denied
    /// in their tool map and allowed in their ruleset.
    pub primary_tools: Vec<String>,
}

/// Root settings object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoomSettings {
    /// Default `tracing` filter.
    pub log_level: String,
    /// Agent selected for new sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,
    /// Global user permission rules.
    pub permission: PermissionConfig,
    /// Agent definitions.
    pub agent: IndexMap<String, AgentConfig>,
    /// History compaction.
    pub compaction: CompactionSettings,
    /// Experimental switches.
    pub experimental: ExperimentalSettings,
    /// Knowledge-base entries shared by every agent.
    pub knowledge_base: Vec<String>,
}

impl Default for LoomSettings {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            default_agent: None,
            permission: PermissionConfig::default(),
            agent: default_agents(),
            compaction: CompactionSettings::default(),
            experimental: ExperimentalSettings::default(),
            knowledge_base: Vec::new(),
        }
    }
}

impl LoomSettings {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.compaction.provider.is_some() != self.compaction.model.is_some() {
            return Err(SettingsError::InvalidValue(
                "compaction.provider and compaction.model must be set together".into(),
            ));
        }
        for (key, agent) in &self.agent {
            if let Some(model) = &agent.model {
                if loom_core::ModelRef::parse(model).is_none() {
                    return Err(SettingsError::InvalidValue(format!(
                        "agent.{key}.model must be provider/model, got {model:?}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        LoomSettings::default().validate().unwrap();
    }

    #[test]
    fn half_compaction_model_is_invalid() {
        let mut s = LoomSettings::default();
        s.compaction.model = Some("haiku".into());
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("set together"));
    }

    #[test]
    fn bad_agent_model_is_invalid() {
        let mut s = LoomSettings::default();
        s.agent.get_mut("builder").unwrap().model = Some("sonnet".into());
        assert!(s.validate().is_err());
    }
}
