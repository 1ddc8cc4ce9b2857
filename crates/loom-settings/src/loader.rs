//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LoomSettings::default()`]
//! 2. If `~/.loom/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::LoomSettings;

/// Resolve the path to the settings file (`~/.loom/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".loom").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LoomSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. Invalid JSON or a value
/// failing validation is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LoomSettings> {
    let defaults = serde_json::to_value(LoomSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: LoomSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// - `LOOM_LOG_LEVEL`, `LOOM_DEFAULT_AGENT`: strings
/// - `LOOM_COMPACTION_MAX_WORDS`: integer, `0` disables auto compaction
/// - `LOOM_COMPACTION_PROVIDER`, `LOOM_COMPACTION_MODEL`: strings
/// - `LOOM_PRIMARY_TOOLS`: comma-separated list
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut LoomSettings) {
    if let Some(v) = read_env_string("LOOM_LOG_LEVEL") {
        settings.log_level = v;
    }
    if let Some(v) = read_env_string("LOOM_DEFAULT_AGENT") {
        settings.default_agent = Some(v);
    }

    // ── Compaction ──────────────────────────────────────────────────
    if let Some(v) = read_env_u64("LOOM_COMPACTION_MAX_WORDS", 0, 100_000_000) {
        settings.compaction.max_words_before_compact = (v > 0).then_some(v);
    }
    if let Some(v) = read_env_string("LOOM_COMPACTION_PROVIDER") {
        settings.compaction.provider = Some(v);
    }
    if let Some(v) = read_env_string("LOOM_COMPACTION_MODEL") {
        settings.compaction.model = Some(v);
    }

    // ── Experimental ────────────────────────────────────────────────
    if let Some(v) = read_env_string("LOOM_PRIMARY_TOOLS") {
        settings.experimental.primary_tools = parse_list(&v);
    }
}

/// Parse a boolean string (`true`/`1`/`yes`/`on`, `false`/`0`/`no`/`off`).
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use crate::types::PermissionValue;
    use assert_matches::assert_matches;
    use loom_core::PermissionAction;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_simple_override() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": 10});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 10);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"compaction": {"max_words_before_compact": 12000, "prompt": "p"}});
        let source = serde_json::json!({"compaction": {"max_words_before_compact": 500}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["compaction"]["max_words_before_compact"], 500);
        assert_eq!(merged["compaction"]["prompt"], "p");
    }

    #[test]
    fn merge_null_is_skipped() {
        let target = serde_json::json!({"a": 1});
        let merged = deep_merge(target, serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_arrays_replace() {
        let target = serde_json::json!({"list": [1, 2, 3]});
        let merged = deep_merge(target, serde_json::json!({"list": [9]}));
        assert_eq!(merged["list"], serde_json::json!([9]));
    }

    #[test]
    fn merge_preserves_key_order() {
        let target = serde_json::json!({"permission": {}});
        let source = serde_json::json!({"permission": {"zeta": "allow", "alpha": "deny"}});
        let merged = deep_merge(target, source);
        let keys: Vec<&String> = merged["permission"].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["zeta", "alpha"]);
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.compaction.threshold(), Some(12_000));
        assert!(settings.agent.contains_key("builder"));
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "permission": {"bash": {"*": "ask", "git *": "allow"}},
                "agent": {"reviewer": {"description": "Reviews code", "permission": "deny"}},
                "experimental": {"primary_tools": ["todowrite"]}
            }"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert!(settings.agent.contains_key("builder"));
        assert_eq!(
            settings.agent["reviewer"].description.as_deref(),
            Some("Reviews code")
        );
        assert_eq!(settings.experimental.primary_tools, ["todowrite"]);

        let (key, value) = settings.permission.iter().next().unwrap();
        assert_eq!(key, "bash");
        assert_matches!(value, PermissionValue::Patterns(p) if p["git *"] == PermissionAction::Allow);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn half_configured_compaction_model_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"compaction": {"provider": "codex"}}"#).unwrap();
        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        );
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE", "On"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "OFF"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("500", 0, 1000), Some(500));
        assert_eq!(parse_u64_range("5000", 0, 1000), None);
        assert_eq!(parse_u64_range("-1", 0, 1000), None);
        assert_eq!(parse_u64_range("abc", 0, 1000), None);
    }

    #[test]
    fn parse_list_trims() {
        assert_eq!(parse_list(" a, b ,,c "), ["a", "b", "c"]);
        assert!(parse_list("").is_empty());
    }
}
