//! Observer hub.
//!
//! Fans session snapshots and trace records out to connected observers and
//! defines the messages exchanged with them.

mod error;
mod message;
mod poller;
mod registry;

pub use error::{CommandError, HubError, PollError};
pub use message::{InboundCommand, OutboundMessage, TracePayload, TraceStatus};
pub use poller::SessionPoller;
pub use registry::{
    Hub, HubHandle, Observer, ObserverId, DEFAULT_EVENT_CAPACITY, DEFAULT_QUEUE_CAPACITY,
};
