//! Directory-level watcher for a single trace file.
//!
//! Watches the file's parent directory with notify-debouncer-full and
//! forwards only the events that touch the exact file path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, Debouncer, RecommendedCache,
};
use tokio::sync::mpsc;

use super::error::WatcherError;

/// Debounce window applied to raw filesystem events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Events emitted by the trace watcher.
#[derive(Debug)]
pub enum WatchEvent {
    /// The trace file was written to (or created).
    Modified,
    /// The underlying watcher reported an error.
    Error(WatcherError),
}

/// Watches one trace file through its containing directory.
///
/// Watching stops when the value is dropped.
pub struct TraceWatcher {
    /// The trace file being watched.
    path: PathBuf,
    /// Keeps the OS watch alive.
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl TraceWatcher {
    /// Start watching `path`.
    ///
    /// Returns the watcher and a receiver for its events.
    ///
    /// # Errors
    ///
    /// Returns an error if the path has no parent directory or the directory
    /// watch cannot be established.
    pub fn new(path: PathBuf) -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>), WatcherError> {
        Self::with_debounce(path, DEFAULT_DEBOUNCE)
    }

    /// Start watching `path` with a custom debounce window.
    ///
    /// # Errors
    ///
    /// See [`TraceWatcher::new`].
    pub fn with_debounce(
        path: PathBuf,
        debounce: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>), WatcherError> {
        let directory = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| WatcherError::NoParent(path.clone()))?
            .to_path_buf();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let target = path.clone();

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let touched = events
                        .iter()
                        .any(|event| is_relevant(&event.kind, &event.paths, &target));
                    if touched {
                        let _ = event_tx.send(WatchEvent::Modified);
                    }
                }
                Err(errors) => {
                    for error in errors {
                        let _ = event_tx.send(WatchEvent::Error(WatcherError::Notify(error)));
                    }
                }
            }
        })?;

        debouncer.watch(&directory, RecursiveMode::NonRecursive)?;

        tracing::debug!(
            path = %path.display(),
            directory = %directory.display(),
            "Watching trace directory"
        );

        Ok((
            Self {
                path,
                _debouncer: debouncer,
            },
            event_rx,
        ))
    }

    /// Get the trace file being watched.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for TraceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceWatcher")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Whether a directory event concerns a write to `target`.
fn is_relevant(kind: &EventKind, paths: &[PathBuf], target: &Path) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
        && paths.iter().any(|p| p == target)
}
