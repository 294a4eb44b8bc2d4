use engine_config::error::SettingsError;
use engine_runtime::error::{ActorError, RuntimeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Failed to stream query results: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Failed to start the reaper: {0}")]
    Actor(#[from] ActorError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}
