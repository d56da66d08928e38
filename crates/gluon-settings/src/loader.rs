//! Settings loading: compiled defaults, JSON file, environment overrides.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::{GluonSettings, NavigationPolicy, TransportKind};

/// Default settings file location: `~/.gluon/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".gluon").join("settings.json")
}

/// Load settings from the default path with env overrides.
pub fn load_settings() -> Result<GluonSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path`, deep-merged over defaults, then apply env overrides.
///
/// A missing file is not an error; defaults are used.
pub fn load_settings_from_path(path: &Path) -> Result<GluonSettings> {
    let defaults = serde_json::to_value(GluonSettings::default())?;
    let merged = match std::fs::read_to_string(path) {
        Ok(raw) => {
            let user: Value = serde_json::from_str(&raw)?;
            deep_merge(defaults, user)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(?path, "no settings file, using defaults");
            defaults
        }
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut settings: GluonSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.validate();
    Ok(settings)
}

/// Recursively merge `overlay` into `base`. Objects merge key by key;
/// any other overlay value replaces the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `GLUON_*` overrides. Unparseable values are skipped with a warning.
pub(crate) fn apply_env_overrides(
    settings: &mut GluonSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(raw) = lookup("GLUON_TRANSPORT") {
        match raw.parse::<TransportKind>() {
            Ok(kind) => settings.channel.transport = kind,
            Err(e) => tracing::warn!(error = %e, "ignoring GLUON_TRANSPORT"),
        }
    }
    if let Some(raw) = lookup("GLUON_NAVIGATION_POLICY") {
        match raw.parse::<NavigationPolicy>() {
            Ok(policy) => settings.navigation.policy = policy,
            Err(e) => tracing::warn!(error = %e, "ignoring GLUON_NAVIGATION_POLICY"),
        }
    }
    if let Some(level) = lookup("GLUON_LOG_LEVEL") {
        settings.logging.level = level;
    }
    if let Some(flag) = lookup("GLUON_LOG_PROTOCOL").and_then(|v| parse_flag(&v)) {
        settings.channel.log_protocol = flag;
    }
    if let Some(flag) = lookup("GLUON_LOG_IPC").and_then(|v| parse_flag(&v)) {
        settings.channel.log_ipc = flag;
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
