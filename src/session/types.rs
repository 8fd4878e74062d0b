//! Session snapshot types.

use serde::{Deserialize, Serialize};

/// Identity of one session instance: `(sid, serial#)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub sid: u32,
    pub serial: u32,
}

impl SessionKey {
    #[must_use]
    pub fn new(sid: u32, serial: u32) -> Self {
        Self { sid, serial }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.sid, self.serial)
    }
}

/// Snapshot of one active database session.
///
/// Snapshots are replaced wholesale; two snapshots describe the same
/// session when their [`SessionKey`]s match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub sid: u32,
    pub serial: u32,
    pub osuser: String,
    pub terminal: String,
    pub program: String,
    pub service: String,
    pub schema: String,
}

impl Session {
    #[must_use]
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.sid, self.serial)
    }
}
