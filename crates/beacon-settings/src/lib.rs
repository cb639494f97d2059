//! # beacon-settings
//!
//! Configuration management with layered sources for the Beacon hub.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** from [`BeaconSettings::default()`]
//! 2. **Settings file** at `~/.beacon/settings.json` or a path given on the
//!    command line (deep-merged over defaults)
//! 3. **Environment variables** such as `BEACON_PORT` (highest priority)
//!
//! The merged result is checked by [`validate`] before it is returned.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    read_settings_file, settings_path, validate,
};
pub use types::*;
