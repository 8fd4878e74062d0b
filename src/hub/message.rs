//! Messages exchanged with observers.
//!
//! Inbound commands are plain text lines (`trace|<sid>|<serial>|<service>`,
//! `untrace`). Outbound messages are JSON objects tagged by `command`:
//!
//! ```json
//! {"command":"trace","data":"started"}
//! {"command":"trace","data":{"id":"abc123xyz","sql":"SELECT 1 FROM DUAL\n","tim":123456}}
//! {"command":"sessions","data":[{"sid":12,"serial":3401,...}]}
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{CommandError, HubError};
use crate::session::{Session, SessionKey};
use crate::watcher::TraceRecord;

/// Outcome of a trace command as reported to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Started,
    Stopped,
}

/// Payload of a `trace` message: either a status or a parsed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TracePayload {
    Status(TraceStatus),
    Record(TraceRecord),
}

/// Message sent from the server to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "data", rename_all = "lowercase")]
pub enum OutboundMessage {
    Trace(TracePayload),
    Sessions(Vec<Session>),
}

impl OutboundMessage {
    #[must_use]
    pub fn status(status: TraceStatus) -> Self {
        Self::Trace(TracePayload::Status(status))
    }

    #[must_use]
    pub fn record(record: TraceRecord) -> Self {
        Self::Trace(TracePayload::Record(record))
    }

    #[must_use]
    pub fn sessions(sessions: Vec<Session>) -> Self {
        Self::Sessions(sessions)
    }

    /// Serialize to the JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, HubError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Command received from an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    /// Start tracing a session.
    Trace { key: SessionKey, service: String },
    /// Stop the active trace.
    Untrace,
}

impl FromStr for InboundCommand {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        if line == "untrace" {
            return Ok(Self::Untrace);
        }

        let fields: Vec<&str> = line.split('|').collect();
        if fields[0] != "trace" {
            return Err(CommandError::Unknown(line.to_string()));
        }

        let [_, sid, serial, service] = fields.as_slice() else {
            return Err(CommandError::ArgumentCount(fields.len()));
        };

        Ok(Self::Trace {
            key: SessionKey::new(parse_number("sid", sid)?, parse_number("serial", serial)?),
            service: (*service).to_string(),
        })
    }
}

fn parse_number(field: &'static str, value: &str) -> Result<u32, CommandError> {
    value
        .trim()
        .parse()
        .map_err(|_| CommandError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}
