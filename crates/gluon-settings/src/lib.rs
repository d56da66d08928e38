//! # gluon-settings
//!
//! Configuration management with layered sources for the Gluon browser channel.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`GluonSettings::default()`]
//! 2. **User file**: `~/.gluon/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `GLUON_*` overrides (highest priority)
//!
//! The process-wide snapshot is reloadable: [`reload_settings_from_path`]
//! swaps the cached value so later [`get_settings`] calls see fresh data,
//! while callers already holding an `Arc` keep a consistent view.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

static SETTINGS: RwLock<Option<Arc<GluonSettings>>> = RwLock::new(None);

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.gluon/settings.json` with env var
/// overrides. If loading fails, compiled defaults are cached instead.
pub fn get_settings() -> Arc<GluonSettings> {
    if let Some(ref s) = *SETTINGS.read() {
        return Arc::clone(s);
    }

    let mut guard = SETTINGS.write();
    // another thread may have initialized while we waited
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            GluonSettings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Initialize the global settings with a specific value.
pub fn init_settings(settings: GluonSettings) {
    *SETTINGS.write() = Some(Arc::new(settings));
}

/// Reload settings from a specific file path and swap the global cache.
pub fn reload_settings_from_path(path: &Path) {
    let new = Arc::new(match load_settings_from_path(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, ?path, "failed to reload settings, falling back to defaults");
            GluonSettings::default()
        }
    });
    *SETTINGS.write() = Some(new);
    tracing::info!(?path, "settings reloaded from disk");
}

#[cfg(test)]
pub(crate) fn reset_settings() {
    *SETTINGS.write() = None;
}
