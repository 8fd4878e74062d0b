//! Hub error types.

use crate::session::DirectoryError;

/// Errors raised when handing messages to the hub.
#[derive(thiserror::Error, Debug)]
pub enum HubError {
    /// The hub event loop has stopped.
    #[error("Hub closed")]
    Closed,

    /// A message could not be serialized.
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Reasons an observer command is rejected.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// Not a command this server understands.
    #[error("Unknown command: {0}")]
    Unknown(String),

    /// `trace` with the wrong number of arguments.
    #[error("Expected trace|<sid>|<serial>|<service>, got {0} fields")]
    ArgumentCount(usize),

    /// A numeric argument did not parse.
    #[error("Invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Errors from one session poll.
#[derive(thiserror::Error, Debug)]
pub enum PollError {
    #[error("Session listing failed: {0}")]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Hub(#[from] HubError),
}
