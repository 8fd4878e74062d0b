//! Trace controller: start, retarget and stop the session trace.
//!
//! All transitions and every read cycle of the trace file run under one
//! async mutex, so the database trace facility, the watcher and the
//! watermark always agree on a single target.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::state::{TracePhase, TraceState};
use crate::hub::{HubHandle, OutboundMessage, TraceStatus};
use crate::session::{Charset, SessionDirectory, SessionKey};
use crate::watcher::{TraceTailer, TraceWatcher, WatchEvent};

/// Watcher plus the task that turns its events into records.
struct Follower {
    _watcher: TraceWatcher,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Follower {
    /// Stop the follow task and wait until it has exited.
    async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Trace follower task failed");
        }
    }
}

#[derive(Default)]
struct Inner {
    state: TraceState,
    follower: Option<Follower>,
}

/// Owns the trace target and its watcher.
pub struct TraceController {
    directory: Arc<dyn SessionDirectory>,
    hub: HubHandle,
    inner: Arc<Mutex<Inner>>,
}

impl TraceController {
    #[must_use]
    pub fn new(directory: Arc<dyn SessionDirectory>, hub: HubHandle) -> Self {
        Self {
            directory,
            hub,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Start tracing `key`.
    ///
    /// Repeating the active target is a no-op. Any other active target is
    /// torn down first (watcher stopped, database trace disabled). Any
    /// failure while establishing the new trace leaves the controller idle
    /// and reports [`TraceStatus::Stopped`].
    pub async fn start(&self, key: SessionKey, service: &str) -> TraceStatus {
        let mut inner = self.inner.lock().await;

        if inner.state.is_tracing(key) {
            tracing::debug!(%key, "Trace already active");
            return TraceStatus::Started;
        }

        self.teardown(&mut inner).await;
        inner.state = TraceState::starting(key, service);

        let Some(path) = self.resolve_trace_file(key).await else {
            inner.state = TraceState::default();
            return TraceStatus::Stopped;
        };
        let charset = self.resolve_charset(service).await;

        match self.directory.enable_trace(key).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(%key, "Database refused to enable trace");
                inner.state = TraceState::default();
                return TraceStatus::Stopped;
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "Failed to enable trace");
                inner.state = TraceState::default();
                return TraceStatus::Stopped;
            }
        }

        let (watcher, events) = match TraceWatcher::new(path.clone()) {
            Ok(watch) => watch,
            Err(e) => {
                tracing::error!(%key, path = %path.display(), error = %e, "Cannot watch trace file");
                self.disable(key).await;
                inner.state = TraceState::default();
                return TraceStatus::Stopped;
            }
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(follow(
            Arc::clone(&self.inner),
            events,
            self.hub.clone(),
            cancel.clone(),
        ));
        inner.follower = Some(Follower {
            _watcher: watcher,
            cancel,
            task,
        });
        inner.state.begin_tracing(TraceTailer::new(path.clone(), charset));

        tracing::info!(%key, service = %service, path = %path.display(), "Tracing started");
        TraceStatus::Started
    }

    /// Stop the active trace, if any. Always reports [`TraceStatus::Stopped`].
    pub async fn stop(&self) -> TraceStatus {
        let mut inner = self.inner.lock().await;
        self.teardown(&mut inner).await;
        TraceStatus::Stopped
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> TracePhase {
        self.inner.lock().await.state.phase()
    }

    /// Session currently traced, if any.
    pub async fn active_key(&self) -> Option<SessionKey> {
        let inner = self.inner.lock().await;
        (inner.state.phase() == TracePhase::Tracing)
            .then(|| inner.state.key())
            .flatten()
    }

    /// Bytes of the active trace file consumed so far.
    pub async fn watermark(&self) -> u64 {
        self.inner.lock().await.state.watermark()
    }

    /// Whether a trace file watcher is currently installed.
    pub async fn has_watcher(&self) -> bool {
        self.inner.lock().await.follower.is_some()
    }

    /// Stop the watcher, disable the database trace and return to idle.
    async fn teardown(&self, inner: &mut Inner) {
        if let Some(follower) = inner.follower.take() {
            follower.shutdown().await;
        }
        if inner.state.phase() == TracePhase::Tracing {
            if let Some(key) = inner.state.key() {
                self.disable(key).await;
                tracing::info!(%key, "Tracing stopped");
            }
        }
        inner.state = TraceState::default();
    }

    async fn disable(&self, key: SessionKey) {
        match self.directory.disable_trace(key).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(%key, "Database refused to disable trace"),
            Err(e) => tracing::warn!(%key, error = %e, "Failed to disable trace"),
        }
    }

    async fn resolve_trace_file(&self, key: SessionKey) -> Option<PathBuf> {
        match self.directory.trace_file_path(key.sid).await {
            Ok(Some(path)) if !path.as_os_str().is_empty() => Some(path),
            Ok(_) => {
                tracing::info!(%key, "Session has no trace file");
                None
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "Failed to resolve trace file");
                None
            }
        }
    }

    async fn resolve_charset(&self, service: &str) -> Charset {
        match self.directory.session_charset(service).await {
            Ok(charset) => charset,
            Err(e) => {
                tracing::warn!(service = %service, error = %e, "Failed to resolve charset, assuming UTF-8");
                Charset::utf8()
            }
        }
    }
}

/// Read the trace file on every change and broadcast the records.
///
/// Waiting for the lock is abandoned on cancellation; a read cycle that
/// holds the lock always runs to completion.
async fn follow(
    inner: Arc<Mutex<Inner>>,
    mut events: mpsc::UnboundedReceiver<WatchEvent>,
    hub: HubHandle,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            WatchEvent::Error(e) => {
                tracing::warn!(error = %e, "Trace watcher error");
            }
            WatchEvent::Modified => {
                let records = {
                    let mut guard = tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        guard = inner.lock() => guard,
                    };
                    guard.state.read_new_records().await
                };

                for record in records {
                    tracing::trace!(id = %record.id, tim = record.tim, "Trace record");
                    if let Err(e) = hub.broadcast(&OutboundMessage::record(record)).await {
                        tracing::warn!(error = %e, "Hub unavailable, stopping trace follower");
                        return;
                    }
                }
            }
        }
    }
    tracing::debug!("Trace follower stopped");
}
