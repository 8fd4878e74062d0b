//! Watcher error types.

use std::path::PathBuf;

/// Errors that can occur while following a trace file.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// Trace file does not exist (yet, or any more).
    #[error("Trace file missing: {0}")]
    FileMissing(PathBuf),

    /// Permission denied accessing file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Trace file has no parent directory to watch.
    #[error("No directory to watch for {0}")]
    NoParent(PathBuf),

    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
