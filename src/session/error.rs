//! Session directory error types.

/// Errors raised while talking to the database.
#[derive(thiserror::Error, Debug)]
pub enum DirectoryError {
    /// The client binary could not be started.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The client ran but reported failure.
    #[error("Database command failed ({status}): {message}")]
    CommandFailed { status: String, message: String },

    /// Output did not have the expected shape.
    #[error("Unexpected database output: {0}")]
    Parse(String),

    /// No connection string was configured.
    #[error("No database connection configured")]
    NotConfigured,

    /// I/O error while exchanging data with the client.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
