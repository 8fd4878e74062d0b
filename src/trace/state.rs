//! Trace state machine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::session::{Charset, SessionKey};
use crate::watcher::{TraceRecord, TraceTailer};

/// Lifecycle phase of the trace target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TracePhase {
    #[default]
    Idle,
    /// Trace file and charset being resolved. Only held inside
    /// `TraceController::start`, under its lock, so callers never observe it.
    Starting,
    Tracing,
}

/// The one session being traced, if any.
///
/// While [`TracePhase::Tracing`], the tailer holds the resolved trace file,
/// its character set and the byte watermark.
#[derive(Debug, Default)]
pub struct TraceState {
    phase: TracePhase,
    key: Option<SessionKey>,
    service: String,
    tailer: Option<TraceTailer>,
}

impl TraceState {
    /// State for a target whose trace file is being resolved.
    #[must_use]
    pub fn starting(key: SessionKey, service: impl Into<String>) -> Self {
        let state = Self {
            phase: TracePhase::Idle,
            key: Some(key),
            service: service.into(),
            tailer: None,
        };
        state.transitioned(TracePhase::Starting)
    }

    /// Enter [`TracePhase::Tracing`] reading through `tailer`.
    pub fn begin_tracing(&mut self, tailer: TraceTailer) {
        self.tailer = Some(tailer);
        self.transition(TracePhase::Tracing);
    }

    #[must_use]
    pub fn phase(&self) -> TracePhase {
        self.phase
    }

    #[must_use]
    pub fn key(&self) -> Option<SessionKey> {
        self.key
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Whether `key` is the session currently being traced.
    #[must_use]
    pub fn is_tracing(&self, key: SessionKey) -> bool {
        self.phase == TracePhase::Tracing && self.key == Some(key)
    }

    #[must_use]
    pub fn trace_file(&self) -> Option<&Path> {
        self.tailer.as_ref().map(TraceTailer::path)
    }

    #[must_use]
    pub fn charset(&self) -> Option<&Charset> {
        self.tailer.as_ref().map(TraceTailer::charset)
    }

    /// Bytes of the trace file consumed so far.
    #[must_use]
    pub fn watermark(&self) -> u64 {
        self.tailer.as_ref().map_or(0, TraceTailer::watermark)
    }

    /// Read and parse whatever was appended to the trace file.
    ///
    /// Read failures are logged and yield no records; the watermark stays
    /// put so the next change retries the same span.
    pub async fn read_new_records(&mut self) -> Vec<TraceRecord> {
        if self.phase != TracePhase::Tracing {
            return Vec::new();
        }
        let Some(tailer) = self.tailer.as_mut() else {
            return Vec::new();
        };
        match tailer.read_new_records().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    path = %tailer.path().display(),
                    watermark = tailer.watermark(),
                    error = %e,
                    "Trace file read failed, will retry on next change"
                );
                Vec::new()
            }
        }
    }

    fn transition(&mut self, phase: TracePhase) {
        tracing::debug!(from = ?self.phase, to = ?phase, key = ?self.key, "Trace state transition");
        self.phase = phase;
    }

    fn transitioned(mut self, phase: TracePhase) -> Self {
        self.transition(phase);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_default_is_idle() {
        let state = TraceState::default();
        assert_eq!(state.phase(), TracePhase::Idle);
        assert!(state.key().is_none());
        assert!(state.trace_file().is_none());
        assert_eq!(state.watermark(), 0);
    }

    #[test]
    fn test_starting_then_tracing() {
        let key = SessionKey::new(12, 34);
        let mut state = TraceState::starting(key, "ORCL");
        assert_eq!(state.phase(), TracePhase::Starting);
        assert!(!state.is_tracing(key));

        let path = PathBuf::from("/u01/trace/orcl_ora_1.trc");
        state.begin_tracing(TraceTailer::new(path.clone(), Charset::from_tag("ZHS16GBK")));

        assert!(state.is_tracing(key));
        assert!(!state.is_tracing(SessionKey::new(12, 35)));
        assert_eq!(state.trace_file(), Some(path.as_path()));
        assert_eq!(state.charset().map(Charset::tag), Some("ZHS16GBK"));
        assert_eq!(state.service(), "ORCL");
        assert_eq!(state.watermark(), 0);
    }

    #[tokio::test]
    async fn test_read_only_while_tracing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "PARSING IN CURSOR #1 tim=9 sqlid='q1'").unwrap();
        writeln!(file, "SELECT 1 FROM DUAL").unwrap();
        writeln!(file, "END OF STMT").unwrap();
        file.flush().unwrap();

        let mut state = TraceState::starting(SessionKey::new(1, 1), "ORCL");
        assert!(state.read_new_records().await.is_empty());

        state.begin_tracing(TraceTailer::new(file.path().to_path_buf(), Charset::utf8()));
        let records = state.read_new_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "q1");
        assert!(state.watermark() > 0);
    }

    #[tokio::test]
    async fn test_read_failure_yields_nothing() {
        let mut state = TraceState::starting(SessionKey::new(1, 1), "ORCL");
        state.begin_tracing(TraceTailer::new(
            PathBuf::from("/nonexistent-dir-12345/orcl_ora_1.trc"),
            Charset::utf8(),
        ));
        assert!(state.read_new_records().await.is_empty());
        assert_eq!(state.watermark(), 0);
    }
}
