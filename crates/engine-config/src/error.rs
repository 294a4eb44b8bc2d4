use std::{io, path::PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating protocol settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse settings file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid data size '{0}': expected a number followed by B, kB, MB or GB")]
    InvalidDataSize(String),

    #[error("Invalid duration '{0}': expected a number followed by ms, s, m or h")]
    InvalidDuration(String),

    #[error("Invalid value in {name}: {source}")]
    Env {
        name: String,
        #[source]
        source: Box<SettingsError>,
    },

    #[error("Invalid settings: {0}")]
    Invalid(String),
}
