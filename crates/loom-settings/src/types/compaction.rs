//! Compaction settings.

use loom_core::ModelRef;
use serde::{Deserialize, Serialize};

/// Default summarization prompt.
pub const DEFAULT_COMPACTION_PROMPT: &str = "Provide a detailed prompt for continuing our conversation above. \
Focus on information that would be helpful for continuing the conversation, including what we did, \
what we're doing, which files we're working on, and what we're going to do next considering new \
session will not have access to our conversation.";

/// History compaction settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionSettings {
    /// Compact once history exceeds this many words. `None` or 0 disables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_words_before_compact: Option<u64>,
    /// Provider of the compaction model. Must be set together with `model`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Compaction model. Must be set together with `provider`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Instruction appended to the formatted history.
    pub prompt: String,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            max_words_before_compact: Some(12_000),
            provider: None,
            model: None,
            prompt: DEFAULT_COMPACTION_PROMPT.to_string(),
        }
    }
}

impl CompactionSettings {
    /// Effective word threshold.
    pub fn threshold(&self) -> Option<u64> {
        self.max_words_before_compact.filter(|n| *n > 0)
    }

    /// Explicit compaction model, when both halves are configured.
    pub fn model_override(&self) -> Option<ModelRef> {
        match (&self.provider, &self.model) {
            (Some(provider), Some(model)) => Some(ModelRef::new(provider, model)),
            _ => None,
        }
    }
}
