//! Error taxonomy for the boot sequence.
//!
//! Variants describe *where* a failure happened. Whether a failure is fatal
//! to the whole boot or only degrades one service is decided by the stage
//! that observes it, never by matching on the message text.

use thiserror::Error;

/// Result alias used across stackinit.
pub type StackResult<T> = Result<T, StackError>;

#[derive(Debug, Error)]
pub enum StackError {
    /// Invalid boot configuration or malformed config file.
    #[error("config error: {0}")]
    Config(String),

    /// Base template missing or unreadable.
    #[error("template error: {0}")]
    Template(String),

    /// Embedded database or schema operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Identity API request failed or returned an unexpected response.
    #[error("identity error: {0}")]
    Identity(String),

    /// External command exited unsuccessfully or could not be started.
    #[error("command `{command}` failed: {message}")]
    Command { command: String, message: String },

    /// Credential store, key material or other on-disk state.
    #[error("storage error: {0}")]
    Storage(String),

    /// Managed process could not be launched or exited.
    #[error("process error: {0}")]
    Process(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
