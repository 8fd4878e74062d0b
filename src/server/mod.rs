//! HTTP and WebSocket front end.

mod connection;
mod error;
mod http;

pub use connection::{handle_command, ws_handler, AppState};
pub use error::ServerError;
pub use http::ProfilerServer;
