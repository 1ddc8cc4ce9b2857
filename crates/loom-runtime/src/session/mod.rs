//! Session turn handling.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `processor` | Bridge event stream → persisted parts on one assistant message |
//! | `authorizer` | Tool pre-approval for the bridge |
//! | `compaction` | Word-threshold monitor and history summarization |
//! | `prompt` | User prompt → compaction checks → assistant turn |

pub mod authorizer;
pub mod compaction;
pub mod processor;
pub mod prompt;

pub use authorizer::TurnAuthorizer;
pub use compaction::{CompactionMonitor, CompactionRequest};
pub use processor::{ProcessedTurn, SessionProcessor, TurnInput, TurnOutcome};
pub use prompt::{PromptInput, SessionPrompt};
