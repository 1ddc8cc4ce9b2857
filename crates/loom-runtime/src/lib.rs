//! # loom-runtime
//!
//! Session runtime for the Loom agent.
//!
//! - [`store`]: session/message/part persistence seam and in-memory store
//! - [`bridge`]: provider bridge seam and tool pre-approval callbacks
//! - [`session`]: turn processor, compaction monitor, prompt loop
//! - [`orchestrator`]: subtask and handoff delegation
//! - [`agents`]: agent registry resolved from settings
//! - [`status`]: per-session busy/idle tracking

#![deny(unsafe_code)]

pub mod agents;
pub mod bridge;
pub mod collaborators;
pub mod context;
pub mod errors;
pub mod orchestrator;
pub mod session;
pub mod status;
pub mod store;
pub mod tool_map;

pub use agents::AgentRegistry;
pub use bridge::{
    Bridge, BridgeError, BridgeEventStream, BridgeRequest, ToolAuthorizer, ToolDecision,
};
pub use collaborators::{
    CompactionContributor, NoopSnapshot, NoopSummary, Patch, Snapshot, SummaryRefresher,
};
pub use context::RuntimeContext;
pub use errors::{RuntimeError, StoreError};
pub use orchestrator::{TaskContext, TaskEngine, TaskInput, TaskMode, TaskResult};
pub use session::{
    CompactionMonitor, CompactionRequest, ProcessedTurn, PromptInput, SessionProcessor,
    SessionPrompt, TurnInput, TurnOutcome,
};
pub use status::StatusTracker;
pub use store::{MemorySessionStore, SessionStore};
