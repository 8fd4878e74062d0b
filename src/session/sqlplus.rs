//! `SessionDirectory` backed by the `sqlplus` command-line client.
//!
//! Each operation runs one `sqlplus -S /nolog` process, feeds it a script on
//! stdin (so the connect string never shows up in the process list) and
//! parses tab-separated rows from stdout.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Charset, DirectoryError, Session, SessionDirectory, SessionKey};

const SCRIPT_SETTINGS: &str = "\
SET HEADING OFF
SET FEEDBACK OFF
SET PAGESIZE 0
SET LINESIZE 32767
SET LONG 32767
SET TRIMOUT ON
SET TAB OFF
SET VERIFY OFF
SET ECHO OFF
WHENEVER SQLERROR EXIT SQL.SQLCODE
WHENEVER OSERROR EXIT FAILURE
";

const FIELD_SEPARATOR: char = '\t';

/// Prefixes sqlplus uses for error lines on stdout.
const ERROR_PREFIXES: [&str; 3] = ["ORA-", "SP2-", "ERROR:"];

/// Session directory that shells out to `sqlplus`.
#[derive(Debug, Clone)]
pub struct SqlPlusDirectory {
    program: PathBuf,
    connection: String,
}

impl SqlPlusDirectory {
    /// Create a directory using `program` and connect string `connection`
    /// (anything sqlplus accepts after `CONNECT`).
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, connection: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            connection: connection.into(),
        }
    }

    /// Check that the database is reachable with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if sqlplus cannot be run or the connection fails.
    pub async fn ping(&self) -> Result<(), DirectoryError> {
        let output = self.run("SELECT 'PONG' FROM DUAL;").await?;
        if output.lines().any(|line| line.trim() == "PONG") {
            Ok(())
        } else {
            Err(DirectoryError::Parse(format!(
                "ping returned unexpected output: {}",
                output.trim()
            )))
        }
    }

    async fn run(&self, statement: &str) -> Result<String, DirectoryError> {
        if self.connection.trim().is_empty() {
            return Err(DirectoryError::NotConfigured);
        }

        let mut child = Command::new(&self.program)
            .arg("-S")
            .arg("/nolog")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DirectoryError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(build_script(&self.connection, statement).as_bytes())
                .await?;
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = first_error_line(&stdout)
                .unwrap_or_else(|| stderr.trim())
                .to_string();
            return Err(DirectoryError::CommandFailed {
                status: output.status.to_string(),
                message,
            });
        }

        if let Some(line) = first_error_line(&stdout) {
            return Err(DirectoryError::CommandFailed {
                status: output.status.to_string(),
                message: line.to_string(),
            });
        }

        Ok(stdout)
    }
}

#[async_trait]
impl SessionDirectory for SqlPlusDirectory {
    async fn list_sessions(&self, exclude_program: &str) -> Result<Vec<Session>, DirectoryError> {
        let statement = sessions_statement(exclude_program);
        let output = self.run(&statement).await?;
        Ok(parse_sessions(&output))
    }

    async fn enable_trace(&self, key: SessionKey) -> Result<bool, DirectoryError> {
        if key.sid == 0 || key.serial == 0 {
            return Ok(false);
        }
        let statement = format!(
            "BEGIN SYS.DBMS_MONITOR.SESSION_TRACE_ENABLE({}, {}, TRUE, TRUE); END;\n/",
            key.sid, key.serial
        );
        self.run(&statement).await?;
        Ok(true)
    }

    async fn disable_trace(&self, key: SessionKey) -> Result<bool, DirectoryError> {
        if key.sid == 0 || key.serial == 0 {
            return Ok(false);
        }
        let statement = format!(
            "BEGIN SYS.DBMS_MONITOR.SESSION_TRACE_DISABLE({}, {}); END;\n/",
            key.sid, key.serial
        );
        self.run(&statement).await?;
        Ok(true)
    }

    async fn trace_file_path(&self, sid: u32) -> Result<Option<PathBuf>, DirectoryError> {
        let statement = format!(
            "SELECT p.tracefile FROM v$session s JOIN v$process p ON s.paddr = p.addr \
             WHERE s.sid = {sid};"
        );
        let output = self.run(&statement).await?;
        Ok(first_value(&output).map(PathBuf::from))
    }

    /// Reads `NLS_CHARACTERSET` through the database link named after the
    /// session's service.
    async fn session_charset(&self, service: &str) -> Result<Charset, DirectoryError> {
        if !is_identifier(service) {
            return Err(DirectoryError::Parse(format!(
                "service name is not a plain identifier: {service:?}"
            )));
        }
        let statement = format!(
            "SELECT value FROM nls_database_parameters@{service} \
             WHERE parameter = 'NLS_CHARACTERSET';"
        );
        let output = self.run(&statement).await?;
        let tag = first_value(&output)
            .ok_or_else(|| DirectoryError::Parse("NLS_CHARACTERSET not reported".to_string()))?;
        tracing::debug!(service = %service, charset = %tag, "Resolved session character set");
        Ok(Charset::from_tag(&tag))
    }
}

/// Session listing query. The sqlplus session running it is always present
/// in `v$session`, so it is excluded by its own sid.
fn sessions_statement(exclude_program: &str) -> String {
    format!(
        "SELECT t.sid || CHR(9) || t.serial# || CHR(9) || t.osuser || CHR(9) || t.terminal \
         || CHR(9) || t.program || CHR(9) || t.service_name || CHR(9) || t.schemaname \
         FROM v$session t \
         WHERE t.service_name NOT LIKE 'SYS%' \
         AND t.sid != TO_NUMBER(SYS_CONTEXT('USERENV', 'SID')) \
         AND NVL(t.program, ' ') != {} \
         AND NVL(t.terminal, ' ') != 'unknown' \
         ORDER BY t.osuser, t.sid;",
        sql_literal(exclude_program)
    )
}

fn build_script(connection: &str, statement: &str) -> String {
    format!("{SCRIPT_SETTINGS}CONNECT {connection}\n{statement}\nEXIT\n")
}

/// Whether `name` can be spliced into a statement as a database link name.
fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#' | '.'))
}

/// Quote `value` as a SQL string literal.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn first_error_line(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| ERROR_PREFIXES.iter().any(|prefix| line.starts_with(prefix)))
}

fn first_value(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(String::from)
}

fn parse_sessions(output: &str) -> Vec<Session> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_session_row(line) {
            Some(session) => Some(session),
            None => {
                tracing::warn!(line = %line, "Skipping malformed session row");
                None
            }
        })
        .collect()
}

fn parse_session_row(line: &str) -> Option<Session> {
    let fields: Vec<&str> = line.trim_end().split(FIELD_SEPARATOR).collect();
    let [sid, serial, osuser, terminal, program, service, schema] = fields.as_slice() else {
        return None;
    };
    Some(Session {
        sid: sid.trim().parse().ok()?,
        serial: serial.trim().parse().ok()?,
        osuser: (*osuser).to_string(),
        terminal: (*terminal).to_string(),
        program: (*program).to_string(),
        service: (*service).to_string(),
        schema: (*schema).to_string(),
    })
}
