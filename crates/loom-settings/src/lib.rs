//! # loom-settings
//!
//! Layered configuration for the Loom agent runtime.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`LoomSettings::default()`]
//! 2. **User file**: `~/.loom/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `LOOM_*` overrides (highest priority)
//!
//! The runtime never reads settings from a global; callers load them once
//! and hand them to the runtime context.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
