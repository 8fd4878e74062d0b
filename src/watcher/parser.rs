//! SQL record parser for session trace text.
//!
//! A record starts at a `PARSING IN CURSOR` line carrying `tim=` and
//! `sqlid='...'` fields, collects every following line as SQL text, and ends
//! at a line beginning with `END OF STMT`:
//!
//! ```text
//! PARSING IN CURSOR #140 len=18 dep=0 uid=0 oct=3 lid=0 tim=123456 hv=1 ad='7f' sqlid='abc123xyz'
//! SELECT 1 FROM DUAL
//! END OF STMT
//! ```

use serde::{Deserialize, Serialize};

/// Token opening a record.
pub const RECORD_START_MARKER: &str = "PARSING IN CURSOR";

/// Token closing a record.
pub const RECORD_END_MARKER: &str = "END OF STMT";

const TIM_FIELD: &str = "tim=";
const SQLID_FIELD: &str = "sqlid='";

/// One parsed SQL execution unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Opaque SQL identifier (`sqlid`).
    pub id: String,
    /// SQL text, one `\n`-terminated entry per source line.
    pub sql: String,
    /// Timestamp field of the start line, in the trace file's own unit.
    pub tim: i64,
}

/// Line scanner turning trace text into [`TraceRecord`]s.
///
/// The parser keeps its partially built record between calls, so a record
/// may start in one incremental read and end in a later one.
#[derive(Debug, Default)]
pub struct RecordParser {
    pending: Option<TraceRecord>,
}

impl RecordParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a record has started but not yet ended.
    #[must_use]
    pub fn in_record(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop any partially built record.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Feed one line (without its terminator). Returns a record when this
    /// line completes one.
    ///
    /// A start line seen while a record is open replaces the open record.
    pub fn feed_line(&mut self, line: &str) -> Option<TraceRecord> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if self.pending.is_none() {
            self.pending = parse_start_line(line);
            return None;
        }

        if line.starts_with(RECORD_END_MARKER) {
            return self.pending.take();
        }

        if let Some(next) = parse_start_line(line) {
            tracing::debug!(
                discarded = ?self.pending.as_ref().map(|r| r.id.as_str()),
                id = %next.id,
                "Record start without end marker, discarding open record"
            );
            self.pending = Some(next);
            return None;
        }

        if let Some(record) = self.pending.as_mut() {
            record.sql.push_str(line);
            record.sql.push('\n');
        }
        None
    }

    /// Feed a block of text, returning completed records in order.
    pub fn feed(&mut self, text: &str) -> Vec<TraceRecord> {
        text.lines().filter_map(|line| self.feed_line(line)).collect()
    }
}

/// Recognize a record start line and seed a record from it.
///
/// The marker must be present and followed somewhere by a `sqlid` field; a
/// missing or unparsable `tim` becomes 0.
fn parse_start_line(line: &str) -> Option<TraceRecord> {
    let fields = after_start_marker(line)?;
    let id = sqlid_field(fields)?;
    let tim = tim_field(fields).unwrap_or(0);
    Some(TraceRecord {
        id: id.to_string(),
        sql: String::new(),
        tim,
    })
}

/// Text following the first `PARSING IN CURSOR` marker, where the words may
/// be separated by any single ASCII whitespace character.
fn after_start_marker(line: &str) -> Option<&str> {
    line.match_indices("PARSING").find_map(|(idx, word)| {
        let rest = &line[idx + word.len()..];
        let rest = skip_whitespace_char(rest)?.strip_prefix("IN")?;
        skip_whitespace_char(rest)?.strip_prefix("CURSOR")
    })
}

fn skip_whitespace_char(s: &str) -> Option<&str> {
    let mut chars = s.chars();
    chars.next().filter(char::is_ascii_whitespace)?;
    Some(chars.as_str())
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tim_field(fields: &str) -> Option<i64> {
    fields.match_indices(TIM_FIELD).find_map(|(idx, name)| {
        let at_boundary = fields[..idx].chars().next_back().map_or(true, |c| !is_word_char(c));
        if !at_boundary {
            return None;
        }
        let value = &fields[idx + name.len()..];
        let digits = value
            .find(|c: char| !c.is_ascii_digit())
            .map_or(value, |end| &value[..end]);
        if digits.is_empty() {
            return None;
        }
        Some(digits.parse().unwrap_or(0))
    })
}

fn sqlid_field(fields: &str) -> Option<&str> {
    fields.match_indices(SQLID_FIELD).find_map(|(idx, name)| {
        let value = &fields[idx + name.len()..];
        let end = value.find(|c: char| !is_word_char(c))?;
        (end > 0 && value[end..].starts_with('\'')).then(|| &value[..end])
    })
}
