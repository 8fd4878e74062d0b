//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::hub::{DEFAULT_EVENT_CAPACITY, DEFAULT_QUEUE_CAPACITY};

/// Top-level profiler configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub poller: PollerConfig,
    pub hub: HubConfig,
    pub connection: ConnectionConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Directory served for every path other than `/ws`.
    pub static_dir: Option<PathBuf>,
    /// Allow cross-origin requests from any origin.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3456,
            static_dir: None,
            cors_permissive: true,
        }
    }
}

impl ServerConfig {
    /// Listen address as `host:port`.
    #[must_use]
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Override host and port from a `host:port` string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string has no port or the port is not a number.
    pub fn apply_addr(&mut self, addr: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidAddress(addr.to_string());
        let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
        let port = port.parse().map_err(|_| invalid())?;
        if !host.is_empty() {
            self.host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        }
        self.port = port;
        Ok(())
    }
}

/// Database access settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlplus connect string, e.g. `scott/tiger@//db01:1521/ORCL`.
    pub connection: Option<String>,
    /// sqlplus executable.
    pub sqlplus_bin: PathBuf,
    /// Program name hidden from the session list.
    pub exclude_program: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection: None,
            sqlplus_bin: PathBuf::from("sqlplus"),
            exclude_program: default_exclude_program(),
        }
    }
}

/// Name of the running executable, so the profiler hides its own sessions.
fn default_exclude_program() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}

/// Session poller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { interval_ms: 2000 }
    }
}

impl PollerConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Observer hub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Outbound messages buffered per observer before it is dropped.
    pub queue_capacity: usize,
    /// Pending hub events (register, broadcast, ...).
    pub event_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Per-connection WebSocket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Time allowed to write one message.
    pub write_wait_secs: u64,
    /// Time allowed between two inbound frames (pongs included).
    pub pong_wait_secs: u64,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            write_wait_secs: 10,
            pong_wait_secs: 60,
            max_message_size: 512,
        }
    }
}

impl ConnectionConfig {
    #[must_use]
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    #[must_use]
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Pings go out at 9/10 of the pong wait.
    #[must_use]
    pub fn ping_period(&self) -> Duration {
        (self.pong_wait() * 9 / 10).max(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProfilerConfig::default();
        assert_eq!(config.server.addr(), "0.0.0.0:3456");
        assert!(config.server.cors_permissive);
        assert_eq!(config.database.sqlplus_bin, PathBuf::from("sqlplus"));
        assert!(!config.database.exclude_program.is_empty());
        assert_eq!(config.poller.interval(), Duration::from_secs(2));
        assert_eq!(config.hub.queue_capacity, 256);
        assert_eq!(config.connection.max_message_size, 512);
    }

    #[test]
    fn test_ping_period_is_nine_tenths_of_pong_wait() {
        let config = ConnectionConfig::default();
        assert_eq!(config.ping_period(), Duration::from_secs(54));
    }

    #[test]
    fn test_apply_addr() {
        let mut server = ServerConfig::default();
        server.apply_addr("127.0.0.1:8080").unwrap();
        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.port, 8080);

        server.apply_addr(":9000").unwrap();
        assert_eq!(server.addr(), "127.0.0.1:9000");

        server.apply_addr("[::1]:7000").unwrap();
        assert_eq!(server.host, "::1");
        assert_eq!(server.addr(), "[::1]:7000");
    }

    #[test]
    fn test_apply_addr_rejects_garbage() {
        let mut server = ServerConfig::default();
        assert!(matches!(
            server.apply_addr("localhost"),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert!(matches!(
            server.apply_addr("localhost:http"),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert_eq!(server.port, 3456);
    }
}
