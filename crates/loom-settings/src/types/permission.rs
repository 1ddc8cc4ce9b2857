//! Permission configuration as written in the settings file.
//!
//! ```json
//! { "*": "allow", "bash": { "*": "ask", "git *": "allow" } }
//! ```
//!
//! Key order is significant: it becomes rule order.

use indexmap::IndexMap;
use loom_core::PermissionAction;
use serde::{Deserialize, Deserializer, Serialize};

/// Value of one permission key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionValue {
    /// One action for every pattern.
    Action(PermissionAction),
    /// Pattern-specific actions, in order.
    Patterns(IndexMap<String, PermissionAction>),
}

/// Ordered `permission -> value` map.
///
/// A bare action string (`"allow"`) is shorthand for `{"*": "allow"}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionConfig(IndexMap<String, PermissionValue>);

impl PermissionConfig {
    /// Empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) `key: action`.
    #[must_use]
    pub fn action(mut self, key: impl Into<String>, action: PermissionAction) -> Self {
        let _ = self.0.insert(key.into(), PermissionValue::Action(action));
        self
    }

    /// Add (or replace) `key: {pattern: action, ...}`.
    #[must_use]
    pub fn patterns<I, P>(mut self, key: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = (P, PermissionAction)>,
        P: Into<String>,
    {
        let map = patterns.into_iter().map(|(p, a)| (p.into(), a)).collect();
        let _ = self.0.insert(key.into(), PermissionValue::Patterns(map));
        self
    }

    /// Entries in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PermissionValue)> {
        self.0.iter()
    }

    /// Whether no keys are configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of configured keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<'de> Deserialize<'de> for PermissionConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Action(PermissionAction),
            Map(IndexMap<String, PermissionValue>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Action(action) => Self::new().action("*", action),
            Raw::Map(map) => Self(map),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shorthand_string_is_wildcard() {
        let cfg: PermissionConfig = serde_json::from_value(json!("deny")).unwrap();
        assert_eq!(cfg, PermissionConfig::new().action("*", PermissionAction::Deny));
    }

    #[test]
    fn nested_patterns_keep_order() {
        let cfg: PermissionConfig = serde_json::from_value(json!({
            "bash": {"*": "ask", "git *": "allow", "git push *": "deny"},
            "edit": "allow"
        }))
        .unwrap();
        let keys: Vec<&String> = cfg.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["bash", "edit"]);

        let (_, bash) = cfg.iter().next().unwrap();
        let PermissionValue::Patterns(patterns) = bash else {
            panic!("expected patterns");
        };
        let order: Vec<&String> = patterns.keys().collect();
        assert_eq!(order, ["*", "git *", "git push *"]);
    }

    #[test]
    fn serializes_back_to_map() {
        let cfg = PermissionConfig::new()
            .action("*", PermissionAction::Allow)
            .patterns("read", [("*.env", PermissionAction::Ask)]);
        let v = serde_json::to_value(&cfg).unwrap();
        assert_eq!(v, json!({"*": "allow", "read": {"*.env": "ask"}}));
        assert_eq!(cfg.len(), 2);
    }
}
