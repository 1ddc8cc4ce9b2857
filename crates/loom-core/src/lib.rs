//! # loom-core
//!
//! Foundation types for the Loom agent runtime.
//!
//! - [`ids`]: ascending branded IDs for sessions, messages, parts, and permission requests
//! - [`session`], [`message`], [`part`]: the persisted conversation tree
//! - [`permission`]: rule, ruleset, and request data
//! - [`agent`]: resolved agent descriptors
//! - [`bridge`]: the event protocol a provider bridge emits
//! - [`events`] and [`emitter`]: domain events and their broadcast channel
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod agent;
pub mod bridge;
pub mod emitter;
pub mod events;
pub mod ids;
pub mod logging;
pub mod message;
pub mod part;
pub mod permission;
pub mod session;
pub mod time;

pub use agent::{AgentInfo, AgentMode, ProviderActions};
pub use bridge::{BridgeEvent, FileChange, FileChangeKind};
pub use emitter::{EventEmitter, SessionEvents};
pub use events::{BaseEvent, BusyPhase, LoomEvent, SessionStatus};
pub use ids::{MessageId, PartId, PermissionRequestId, SessionId};
pub use message::{Message, MessageError, MessageWithParts, ModelRef, Role, TokenUsage};
pub use part::{Part, PartKind, ToolPart, ToolState};
pub use permission::{PermissionAction, PermissionReply, PermissionRequest, PermissionRule, Ruleset};
pub use session::Session;
