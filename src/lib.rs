//! Ora Profiler - live SQL trace streaming for Oracle sessions.

pub mod config;
pub mod display;
pub mod error;
pub mod hub;
pub mod server;
pub mod session;
pub mod trace;
pub mod watcher;
