//! Vendor tool names → permission kinds and target patterns.
//!
//! The tables are fixed. Unknown tools fall back to their lowercased name,
//! and their target is `*`.

use indexmap::IndexMap;
use loom_core::PermissionAction;
use serde_json::Value;

/// Permission kind governing a tool the provider asks to run.
pub fn permission_kind(tool: &str) -> String {
    match tool {
        "Bash" => "bash".into(),
        "Edit" | "Write" | "MultiEdit" | "NotebookEdit" => "edit".into(),
        "Read" => "read".into(),
        "Glob" | "Grep" => "search".into(),
        "Task" => "task".into(),
        "WebFetch" | "WebSearch" => "web".into(),
        other => other.to_lowercase(),
    }
}

/// Permission kind an agent's provider-action entry derives.
///
/// Wider than [`permission_kind`]: it also covers the command and
/// file-change action names and the question tool, which agent
/// configuration grants by action name.
pub fn action_permission_kind(action: &str) -> String {
    match action {
        "commandExecution" => "bash".into(),
        "fileChange" => "edit".into(),
        "AskUserQuestion" => "question".into(),
        other => permission_kind(other),
    }
}

/// Input fields that identify what `tool` acts on, most specific first.
pub fn pattern_fields(tool: &str) -> &'static [&'static str] {
    match tool {
        "Bash" => &["command"],
        "Edit" | "Write" | "MultiEdit" | "NotebookEdit" => &["file_path", "path"],
        "Read" => &["file_path"],
        "Glob" => &["pattern"],
        "Grep" => &["path", "pattern"],
        "Task" => &["prompt", "description"],
        "WebFetch" => &["url"],
        "WebSearch" => &["query"],
        _ => &[],
    }
}

/// Target pattern for a call: the first non-empty identifying field, else `*`.
pub fn pattern(tool: &str, input: &Value) -> String {
    pattern_fields(tool)
        .iter()
        .find_map(|field| {
            input
                .get(*field)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
        })
        .map_or_else(|| "*".to_string(), ToString::to_string)
}

/// Legacy `tools_allowed` IDs and the vendor tools each one enables.
const LEGACY_TOOLS: &[(&str, &[&str])] = &[
    ("bash", &["Bash"]),
    ("read", &["Read"]),
    ("search", &["Glob", "Grep"]),
    ("search_remote", &["WebFetch", "WebSearch"]),
    ("apply_patch", &["Edit", "Write", "MultiEdit", "NotebookEdit"]),
    ("task", &["Task"]),
    ("todowrite", &["TodoWrite"]),
    ("question", &["AskUserQuestion"]),
];

/// Convert legacy `tools_allowed` IDs into allow actions. Unknown IDs are skipped.
pub fn legacy_actions(tools_allowed: &[String]) -> IndexMap<String, PermissionAction> {
    let mut actions = IndexMap::new();
    for id in tools_allowed {
        let Some((_, tools)) = LEGACY_TOOLS.iter().find(|(legacy, _)| legacy == id) else {
            continue;
        };
        for tool in *tools {
            let _ = actions.insert((*tool).to_string(), PermissionAction::Allow);
        }
    }
    actions
}
