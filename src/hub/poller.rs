//! Periodic session list publisher.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::error::PollError;
use super::message::OutboundMessage;
use super::registry::HubHandle;
use crate::session::{same_identities, Session, SessionDirectory};

/// Polls the session directory and publishes the list when it changes.
pub struct SessionPoller {
    directory: Arc<dyn SessionDirectory>,
    hub: HubHandle,
    exclude_program: String,
    interval: Duration,
    last: Vec<Session>,
}

impl SessionPoller {
    #[must_use]
    pub fn new(
        directory: Arc<dyn SessionDirectory>,
        hub: HubHandle,
        exclude_program: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            directory,
            hub,
            exclude_program: exclude_program.into(),
            interval,
            last: Vec::new(),
        }
    }

    /// The most recently published session list.
    #[must_use]
    pub fn last_published(&self) -> &[Session] {
        &self.last
    }

    /// Run one poll cycle. Returns whether a new list was published.
    ///
    /// Nothing is fetched while no observer is connected. A list whose
    /// `(sid, serial)` sequence matches the last published one is not
    /// published again.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or the hub fails; the last published
    /// list is left untouched.
    pub async fn poll_once(&mut self) -> Result<bool, PollError> {
        if self.hub.observer_count() == 0 {
            return Ok(false);
        }

        let sessions = self.directory.list_sessions(&self.exclude_program).await?;
        if same_identities(&sessions, &self.last) {
            return Ok(false);
        }

        tracing::debug!(
            previous = self.last.len(),
            current = sessions.len(),
            "Session list changed"
        );
        self.hub
            .publish(&OutboundMessage::sessions(sessions.clone()))
            .await?;
        self.last = sessions;
        Ok(true)
    }

    /// Poll on a fixed interval until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(interval_ms = self.interval.as_millis(), "Session poller started");
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::warn!(error = %e, "Session poll failed");
                    }
                }
            }
        }
        tracing::debug!("Session poller stopped");
    }
}
