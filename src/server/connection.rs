//! One WebSocket observer connection.
//!
//! Each connection runs a write pump (hub queue to socket, plus pings) and
//! a read pump (commands from the socket). Either side ending closes the
//! other through a shared cancellation token.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ConnectionConfig;
use crate::hub::{
    CommandError, HubHandle, InboundCommand, Observer, ObserverId, OutboundMessage, TraceStatus,
};
use crate::trace::TraceController;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub controller: Arc<TraceController>,
    pub connection: ConnectionConfig,
    /// Outbound queue length per observer.
    pub queue_capacity: usize,
}

/// GET /ws - Upgrade to an observer connection.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let limit = state.connection.max_message_size;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (observer, queue) = Observer::new(state.queue_capacity);
    let id = observer.id();
    if let Err(e) = state.hub.register(observer).await {
        tracing::warn!(error = %e, "Hub unavailable, refusing observer");
        return;
    }
    tracing::info!(observer = %id, "Observer connected");

    let (sink, stream) = socket.split();
    let closed = CancellationToken::new();
    let writer = tokio::spawn(write_pump(
        sink,
        queue,
        state.connection.clone(),
        closed.clone(),
    ));

    read_pump(stream, &state, id, &closed).await;
    closed.cancel();

    if let Err(e) = state.hub.unregister(id).await {
        tracing::debug!(observer = %id, error = %e, "Unregister after hub shutdown");
    }
    if let Err(e) = writer.await {
        tracing::warn!(observer = %id, error = %e, "Write pump failed");
    }
    tracing::info!(observer = %id, "Observer disconnected");
}

/// Forward queued messages to the socket and keep the connection alive.
async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<Arc<str>>,
    config: ConnectionConfig,
    closed: CancellationToken,
) {
    let write_wait = config.write_wait();
    let period = config.ping_period();
    let mut ping = interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            () = closed.cancelled() => break,

            message = queue.recv() => match message {
                Some(text) => {
                    if !send(&mut sink, Message::Text(text.to_string()), write_wait).await {
                        break;
                    }
                }
                // Dropped by the hub.
                None => {
                    send(&mut sink, Message::Close(None), write_wait).await;
                    break;
                }
            },

            _ = ping.tick() => {
                if !send(&mut sink, Message::Ping(Vec::new()), write_wait).await {
                    break;
                }
            }
        }
    }
    closed.cancel();
}

/// Send one frame within the write deadline.
async fn send(sink: &mut SplitSink<WebSocket, Message>, message: Message, wait: Duration) -> bool {
    match tokio::time::timeout(wait, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Socket write failed");
            false
        }
        Err(_) => {
            tracing::warn!(wait_secs = wait.as_secs(), "Socket write deadline exceeded");
            false
        }
    }
}

/// Handle inbound frames until the peer leaves, goes quiet or the writer stops.
async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    state: &AppState,
    id: ObserverId,
    closed: &CancellationToken,
) {
    let pong_wait = state.connection.pong_wait();
    loop {
        let frame = tokio::select! {
            biased;
            () = closed.cancelled() => break,
            frame = tokio::time::timeout(pong_wait, stream.next()) => frame,
        };

        match frame {
            Err(_) => {
                tracing::info!(observer = %id, "Observer read deadline exceeded");
                break;
            }
            Ok(None | Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(observer = %id, error = %e, "Socket read failed");
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => handle_command(&text, state, id).await,
            // Pongs only refresh the deadline; pings are answered by the socket.
            Ok(Some(Ok(_))) => {}
        }
    }
}

/// Execute one observer command and answer the observer with the outcome.
///
/// Malformed trace commands are answered with `stopped` without touching the
/// trace state. Unrecognized commands are ignored.
pub async fn handle_command(text: &str, state: &AppState, id: ObserverId) {
    let status = match text.parse::<InboundCommand>() {
        Ok(InboundCommand::Trace { key, service }) => {
            tracing::debug!(observer = %id, %key, service = %service, "Trace requested");
            state.controller.start(key, &service).await
        }
        Ok(InboundCommand::Untrace) => {
            tracing::debug!(observer = %id, "Untrace requested");
            state.controller.stop().await
        }
        Err(CommandError::Unknown(command)) => {
            tracing::debug!(observer = %id, command = %command, "Ignoring unknown command");
            return;
        }
        Err(e) => {
            tracing::warn!(observer = %id, error = %e, "Rejected malformed command");
            TraceStatus::Stopped
        }
    };

    if let Err(e) = state
        .hub
        .send_to(id, &OutboundMessage::status(status))
        .await
    {
        tracing::warn!(observer = %id, error = %e, "Failed to answer observer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use crate::session::{Charset, DirectoryError, Session, SessionDirectory, SessionKey};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Directory with at most one trace file; counts enable and disable calls.
    #[derive(Default)]
    struct StubDirectory {
        trace_file: Option<PathBuf>,
        enables: AtomicUsize,
        disables: AtomicUsize,
    }

    #[async_trait]
    impl SessionDirectory for StubDirectory {
        async fn list_sessions(&self, _exclude: &str) -> Result<Vec<Session>, DirectoryError> {
            Ok(Vec::new())
        }
        async fn enable_trace(&self, _key: SessionKey) -> Result<bool, DirectoryError> {
            self.enables.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        }
        async fn disable_trace(&self, _key: SessionKey) -> Result<bool, DirectoryError> {
            self.disables.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        }
        async fn trace_file_path(&self, _sid: u32) -> Result<Option<PathBuf>, DirectoryError> {
            Ok(self.trace_file.clone())
        }
        async fn session_charset(&self, _service: &str) -> Result<Charset, DirectoryError> {
            Ok(Charset::utf8())
        }
    }

    async fn setup() -> (
        AppState,
        Arc<StubDirectory>,
        ObserverId,
        mpsc::Receiver<Arc<str>>,
        CancellationToken,
    ) {
        setup_with(StubDirectory::default()).await
    }

    async fn setup_with(
        directory: StubDirectory,
    ) -> (
        AppState,
        Arc<StubDirectory>,
        ObserverId,
        mpsc::Receiver<Arc<str>>,
        CancellationToken,
    ) {
        let (hub, handle) = Hub::new(16);
        let cancel = CancellationToken::new();
        tokio::spawn(hub.run(cancel.clone()));

        let directory = Arc::new(directory);
        let controller = Arc::new(TraceController::new(directory.clone(), handle.clone()));
        let state = AppState {
            hub: handle,
            controller,
            connection: ConnectionConfig::default(),
            queue_capacity: 16,
        };

        let (observer, rx) = Observer::new(16);
        let id = observer.id();
        state.hub.register(observer).await.unwrap();
        (state, directory, id, rx, cancel)
    }

    async fn next_json(rx: &mut mpsc::Receiver<Arc<str>>) -> serde_json::Value {
        let text = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_trace_answers_stopped() {
        let (state, directory, id, mut rx, cancel) = setup().await;

        handle_command("trace|abc|1|ORCL", &state, id).await;

        let reply = next_json(&mut rx).await;
        assert_eq!(reply["command"], "trace");
        assert_eq!(reply["data"], "stopped");
        assert_eq!(directory.enables.load(Ordering::Relaxed), 0);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_malformed_trace_keeps_active_trace() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("orcl_ora_9.trc");
        std::fs::write(&path, "").unwrap();
        let (state, directory, id, mut rx, cancel) = setup_with(StubDirectory {
            trace_file: Some(path),
            ..StubDirectory::default()
        })
        .await;

        handle_command("trace|12|3401|ORCL", &state, id).await;
        assert_eq!(next_json(&mut rx).await["data"], "started");

        handle_command("trace|abc|1|ORCL", &state, id).await;
        assert_eq!(next_json(&mut rx).await["data"], "stopped");

        assert_eq!(
            state.controller.active_key().await,
            Some(SessionKey::new(12, 3401))
        );
        assert_eq!(directory.enables.load(Ordering::Relaxed), 1);
        assert_eq!(directory.disables.load(Ordering::Relaxed), 0);

        state.controller.stop().await;
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unresolvable_trace_file_answers_stopped() {
        let (state, directory, id, mut rx, cancel) = setup().await;

        handle_command("trace|12|3401|ORCL", &state, id).await;

        assert_eq!(next_json(&mut rx).await["data"], "stopped");
        assert_eq!(directory.enables.load(Ordering::Relaxed), 0);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_untrace_answers_stopped() {
        let (state, _directory, id, mut rx, cancel) = setup().await;

        handle_command("untrace", &state, id).await;

        assert_eq!(next_json(&mut rx).await["data"], "stopped");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unknown_command_is_ignored() {
        let (state, _directory, id, mut rx, cancel) = setup().await;

        handle_command("hello", &state, id).await;

        let reply = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(reply.is_err());
        cancel.cancel();
    }
}
