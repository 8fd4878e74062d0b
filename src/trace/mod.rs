//! Session trace lifecycle.
//!
//! Tracks the single session being traced and drives the database trace
//! facility and the trace file watcher through start, retarget and stop.

mod controller;
mod state;

pub use controller::TraceController;
pub use state::{TracePhase, TraceState};
