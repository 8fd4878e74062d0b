//! Database session directory.
//!
//! Session snapshots, character set tags, and the collaborator that talks to
//! the database on behalf of the trace pipeline.

mod charset;
mod directory;
mod error;
mod sqlplus;
mod types;

pub use charset::Charset;
pub use directory::{same_identities, SessionDirectory};
pub use error::DirectoryError;
pub use sqlplus::SqlPlusDirectory;
pub use types::{Session, SessionKey};
