//! The database collaborator seen by the trace pipeline.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{Charset, DirectoryError, Session, SessionKey};

/// Operations the trace pipeline needs from the database.
///
/// Implementations are shared behind an `Arc` between the trace controller
/// and the session poller.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// List active user sessions, hiding those run by `exclude_program`.
    async fn list_sessions(&self, exclude_program: &str) -> Result<Vec<Session>, DirectoryError>;

    /// Turn on SQL tracing for a session. `Ok(false)` means the database
    /// refused or the key is not traceable.
    async fn enable_trace(&self, key: SessionKey) -> Result<bool, DirectoryError>;

    /// Turn off SQL tracing for a session.
    async fn disable_trace(&self, key: SessionKey) -> Result<bool, DirectoryError>;

    /// Path of the trace file attached to `sid`, `None` when the session has
    /// no trace file (for example because it already ended).
    async fn trace_file_path(&self, sid: u32) -> Result<Option<PathBuf>, DirectoryError>;

    /// Character set used by the database behind `service`.
    async fn session_charset(&self, service: &str) -> Result<Charset, DirectoryError>;
}

/// Order-sensitive comparison of two session lists by `(sid, serial)` only.
#[must_use]
pub fn same_identities(a: &[Session], b: &[Session]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.key() == y.key())
}
