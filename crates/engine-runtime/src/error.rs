use engine_config::error::SettingsError;
use engine_processing::error::CursorError;
use model::core::identifiers::QueryId;
use thiserror::Error;

/// Errors surfaced by the query runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Query '{0}' not found")]
    QueryNotFound(QueryId),

    #[error("Query '{0}' is already registered")]
    AlreadyRegistered(QueryId),

    /// The caller asked for a token that cannot be served.
    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// This usually indicates that the task was cancelled or panicked.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),
}

/// Common error type for all actors in the engine.
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("Mailbox closed")]
    MailboxClosed,

    #[error("Actor internal error: {0}")]
    Internal(String),
}
