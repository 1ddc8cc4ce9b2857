//! Ruleset evaluation and merging.
//!
//! Precedence is positional: the **last** rule matching both the permission
//! kind and the target wins. Merging appends, so rulesets merged later
//! override the ones merged earlier.

use loom_core::{PermissionAction, PermissionRule, Ruleset};

use crate::wildcard;

/// Concatenate rulesets in order. Later rulesets take precedence.
pub fn merge(rulesets: &[&[PermissionRule]]) -> Ruleset {
    rulesets.iter().flat_map(|r| r.iter().cloned()).collect()
}

/// Last rule matching `permission` and `pattern`, if any.
pub fn find_rule<'a>(
    permission: &str,
    pattern: &str,
    ruleset: &'a [PermissionRule],
) -> Option<&'a PermissionRule> {
    ruleset.iter().rev().find(|rule| {
        wildcard::matches(permission, &rule.permission) && wildcard::matches(pattern, &rule.pattern)
    })
}

/// Action for `permission` on `pattern`. Defaults to [`PermissionAction::Ask`].
pub fn evaluate(permission: &str, pattern: &str, ruleset: &[PermissionRule]) -> PermissionAction {
    find_rule(permission, pattern, ruleset).map_or(PermissionAction::Ask, |rule| rule.action)
}

/// Permission kind a tool name is governed by for `disabled` checks.
fn tool_permission(tool: &str) -> &str {
    match tool {
        "edit" | "write" | "patch" | "multiedit" | "apply_patch" => "edit",
        other => other,
    }
}

/// Tools whose permission kind is denied outright (last rule with
/// pattern `*` and action `deny`).
pub fn disabled<'a>(tools: &[&'a str], ruleset: &[PermissionRule]) -> Vec<&'a str> {
    tools
        .iter()
        .copied()
        .filter(|tool| {
            let permission = tool_permission(tool);
            ruleset
                .iter()
                .rev()
                .find(|rule| wildcard::matches(permission, &rule.permission))
                .is_some_and(|rule| rule.pattern == "*" && rule.action == PermissionAction::Deny)
        })
        .collect()
}

/// Whether any rule in `ruleset` names `permission` exactly.
pub fn mentions(permission: &str, ruleset: &[PermissionRule]) -> bool {
    ruleset.iter().any(|rule| rule.permission == permission)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::PermissionAction::{Allow, Ask, Deny};
    use proptest::prelude::*;

    fn rule(p: &str, pat: &str, a: PermissionAction) -> PermissionRule {
        PermissionRule::new(p, pat, a)
    }

    #[test]
    fn git_rule_overrides_wildcard_ask() {
        let rules = vec![rule("bash", "*", Ask), rule("bash", "git *", Allow)];
        assert_eq!(evaluate("bash", "git status", &rules), Allow);
        assert_eq!(evaluate("bash", "rm -rf /", &rules), Ask);
    }

    #[test]
    fn no_match_defaults_to_ask() {
        assert_eq!(evaluate("edit", "src/main.rs", &[]), Ask);
        let rules = vec![rule("bash", "*", Allow)];
        assert_eq!(evaluate("edit", "src/main.rs", &rules), Ask);
    }

    #[test]
    fn wildcard_permission_kind() {
        let rules = vec![rule("*", "*", Deny), rule("read", "*", Allow)];
        assert_eq!(evaluate("read", "a.rs", &rules), Allow);
        assert_eq!(evaluate("bash", "ls", &rules), Deny);
    }

    #[test]
    fn later_merge_wins() {
        let defaults = vec![rule("*", "*", Allow)];
        let agent = vec![rule("task", "*", Deny)];
        let merged = merge(&[&defaults, &agent]);
        assert_eq!(merged.len(), 2);
        assert_eq!(evaluate("task", "general", &merged), Deny);
        assert_eq!(evaluate("bash", "ls", &merged), Allow);
    }

    #[test]
    fn disabled_only_for_blanket_deny() {
        let rules = vec![
            rule("*", "*", Allow),
            rule("edit", "*", Deny),
            rule("bash", "rm *", Deny),
        ];
        assert_eq!(disabled(&["write", "bash", "read"], &rules), vec!["write"]);
    }

    #[test]
    fn mentions_is_exact() {
        let rules = vec![rule("task", "explore", Allow)];
        assert!(mentions("task", &rules));
        assert!(!mentions("task_handoff", &rules));
    }

    fn action() -> impl Strategy<Value = PermissionAction> {
        prop_oneof![Just(Allow), Just(Ask), Just(Deny)]
    }

    fn kind() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("bash".to_string()),
            Just("edit".to_string()),
            Just("task".to_string()),
            Just("*".to_string()),
        ]
    }

    fn target() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("*".to_string()),
            Just("git *".to_string()),
            Just("src/*".to_string()),
            Just("plan".to_string()),
            "[a-z ]{0,8}",
        ]
    }

    fn ruleset() -> impl Strategy<Value = Ruleset> {
        prop::collection::vec(
            (kind(), target(), action()).prop_map(|(p, t, a)| PermissionRule::new(p, t, a)),
            0..8,
        )
    }

    proptest! {
        #[test]
        fn evaluation_is_idempotent(rules in ruleset(), k in "[a-z]{1,6}", t in "[a-z /]{0,12}") {
            prop_assert_eq!(evaluate(&k, &t, &rules), evaluate(&k, &t, &rules));
        }

        #[test]
        fn later_ruleset_with_match_decides(
            a in ruleset(),
            b in ruleset(),
            k in prop_oneof![Just("bash"), Just("edit"), Just("task")],
            t in prop_oneof![Just("git status"), Just("src/lib.rs"), Just("plan"), Just("")],
        ) {
            let merged = merge(&[&a, &b]);
            if find_rule(k, t, &b).is_some() {
                prop_assert_eq!(evaluate(k, t, &merged), evaluate(k, t, &b));
            }
        }
    }
}
