//! Glob-style matching for permission kinds and patterns.
//!
//! - `*` matches any run of characters (including none and `/`)
//! - `?` matches exactly one character
//! - a trailing `" *"` also matches the bare prefix (`"git *"` matches `"git"`)
//! - everything else matches literally; the whole input must match

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::Mutex;
use regex::Regex;

/// Compiled patterns kept around between evaluations.
const CACHE_LIMIT: usize = 1024;

static CACHE: LazyLock<Mutex<HashMap<String, Regex>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Translate a wildcard pattern into an anchored regex source.
fn to_regex(pattern: &str) -> String {
    let mut body = String::with_capacity(pattern.len() * 2);
    for ch in pattern.chars() {
        match ch {
            '*' => body.push_str(".*"),
            '?' => body.push('.'),
            other => body.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    if let Some(prefix) = body.strip_suffix(" .*") {
        body = format!("{prefix}( .*)?");
    }
    format!("(?s)^{body}$")
}

fn compiled(pattern: &str) -> Option<Regex> {
    if let Some(re) = CACHE.lock().get(pattern) {
        return Some(re.clone());
    }
    let re = match Regex::new(&to_regex(pattern)) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(pattern, error = %e, "unusable wildcard pattern");
            return None;
        }
    };
    let mut cache = CACHE.lock();
    if cache.len() >= CACHE_LIMIT {
        cache.clear();
    }
    let _ = cache.insert(pattern.to_string(), re.clone());
    Some(re)
}

/// Whether `input` matches wildcard `pattern`.
pub fn matches(input: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    compiled(pattern).is_some_and(|re| re.is_match(input))
}
