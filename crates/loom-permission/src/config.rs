//! Settings → ruleset conversion.

use loom_core::{PermissionRule, Ruleset};
use loom_settings::{PermissionConfig, PermissionValue};

/// Expand `~` and `~/...` against `$HOME`.
fn expand_home(pattern: &str) -> String {
    let Ok(home) = std::env::var("HOME") else {
        return pattern.to_string();
    };
    if pattern == "~" {
        home
    } else if let Some(rest) = pattern.strip_prefix("~/") {
        format!("{home}/{rest}")
    } else {
        pattern.to_string()
    }
}

/// Convert configuration into rules, preserving key and pattern order.
///
/// `key: action` becomes `{key, "*", action}`; `key: {pattern: action}`
/// becomes one rule per pattern.
pub fn from_config(config: &PermissionConfig) -> Ruleset {
    let mut rules = Vec::with_capacity(config.len());
    for (permission, value) in config.iter() {
        match value {
            PermissionValue::Action(action) => {
                rules.push(PermissionRule::new(permission.as_str(), "*", *action));
            }
            PermissionValue::Patterns(patterns) => {
                for (pattern, action) in patterns {
                    rules.push(PermissionRule::new(
                        permission.as_str(),
                        expand_home(pattern),
                        *action,
                    ));
                }
            }
        }
    }
    rules
}
