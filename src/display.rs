//! Colored terminal output for the `sessions` command.

use std::fmt::Write as _;
use std::io::{self, Write};

use owo_colors::OwoColorize;

use crate::session::Session;

/// Maximum width of a free-text column.
const DEFAULT_MAX_LEN: usize = 24;

/// Truncate a string to a maximum number of characters, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

/// Render sessions as an aligned plain-text table.
#[must_use]
pub fn format_sessions(sessions: &[Session]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>6} {:>7}  {:<16} {:<12} {:<24} {:<12} {}",
        "SID", "SERIAL#", "OSUSER", "TERMINAL", "PROGRAM", "SERVICE", "SCHEMA"
    );
    for session in sessions {
        let _ = writeln!(
            out,
            "{:>6} {:>7}  {:<16} {:<12} {:<24} {:<12} {}",
            session.sid,
            session.serial,
            truncate(&session.osuser, 16),
            truncate(&session.terminal, 12),
            truncate(&session.program, DEFAULT_MAX_LEN),
            truncate(&session.service, 12),
            session.schema
        );
    }
    out
}

/// Print the session table to stdout, header highlighted.
pub fn print_sessions(sessions: &[Session]) {
    let table = format_sessions(sessions);
    let mut lines = table.lines();
    if let Some(header) = lines.next() {
        println!("{}", header.bold());
    }
    for line in lines {
        println!("{line}");
    }
    println!("{}", format!("{} session(s)", sessions.len()).dimmed());
    let _ = io::stdout().flush();
}
