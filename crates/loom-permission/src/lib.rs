//! # loom-permission
//!
//! Permission ruleset engine for the Loom agent runtime.
//!
//! - [`wildcard`]: glob-style matching of permission kinds and targets
//! - [`ruleset`]: `merge`, `evaluate` (last match wins, default `ask`), `disabled`
//! - [`config`]: settings → ruleset conversion
//! - [`service`]: interactive `ask`/`reply` with cancellation and rule persistence

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod ruleset;
pub mod service;
pub mod wildcard;

pub use config::from_config;
pub use errors::PermissionError;
pub use ruleset::{disabled, evaluate, find_rule, mentions, merge};
pub use service::{AskInput, NoopPersister, PermissionService, RulePersister};
