//! Trace file watching and parsing.
//!
//! Follows a growing trace file: a directory-level watcher reports writes to
//! the file, the tailer reads what was appended since the last watermark,
//! and the parser turns the text into SQL records.

mod error;
mod file_watcher;
mod parser;
mod tailer;

pub use error::WatcherError;
pub use file_watcher::{TraceWatcher, WatchEvent, DEFAULT_DEBOUNCE};
pub use parser::{RecordParser, TraceRecord, RECORD_END_MARKER, RECORD_START_MARKER};
pub use tailer::TraceTailer;
