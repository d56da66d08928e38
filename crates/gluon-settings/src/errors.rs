//! Settings error types.

use std::path::PathBuf;

/// Errors raised while loading or parsing settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings at {path}: {source}")]
    Io {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON or does not match the schema.
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A single value could not be interpreted (env override, policy string).
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// Setting name.
        field: String,
        /// Rejected raw value.
        value: String,
    },
}

/// Convenience alias for settings results.
pub type Result<T> = std::result::Result<T, SettingsError>;
