//! Top-level error type for the profiler binary.

use crate::config::ConfigError;
use crate::server::ServerError;
use crate::session::DirectoryError;

/// Errors that abort the whole process.
#[derive(thiserror::Error, Debug)]
pub enum ProfilerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database unreachable: {0}")]
    Database(#[from] DirectoryError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("No database connection configured (use --conn or [database] connection)")]
    MissingConnection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_display() {
        let error = ProfilerError::from(DirectoryError::CommandFailed {
            status: "exit status: 1".to_string(),
            message: "ORA-12541: TNS:no listener".to_string(),
        });
        assert!(error.to_string().starts_with("Database unreachable"));
        assert!(error.to_string().contains("ORA-12541"));
    }

    #[test]
    fn test_missing_connection_display() {
        assert!(ProfilerError::MissingConnection
            .to_string()
            .contains("--conn"));
    }
}
