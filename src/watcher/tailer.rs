//! Incremental trace file reader.
//!
//! Reads lines appended to a trace file since the last read and feeds them
//! to a [`RecordParser`].

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use super::error::WatcherError;
use super::parser::{RecordParser, TraceRecord};
use crate::session::Charset;

/// Incremental trace file reader that tracks a byte watermark.
///
/// The watermark is a raw file offset and only ever covers complete lines:
/// a trailing line without its `\n` is left for the next read.
#[derive(Debug)]
pub struct TraceTailer {
    /// Path to the trace file.
    path: PathBuf,
    /// Bytes of the file consumed so far.
    watermark: u64,
    /// Decoder for the file's bytes.
    charset: Charset,
    /// Parser state carried across reads.
    parser: RecordParser,
}

impl TraceTailer {
    /// Create a new tailer starting at the beginning of the file.
    #[must_use]
    pub fn new(path: PathBuf, charset: Charset) -> Self {
        Self {
            path,
            watermark: 0,
            charset,
            parser: RecordParser::new(),
        }
    }

    /// Create a new tailer starting at a specific offset.
    #[must_use]
    pub fn with_watermark(path: PathBuf, charset: Charset, watermark: u64) -> Self {
        Self {
            watermark,
            ..Self::new(path, charset)
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    #[must_use]
    pub fn charset(&self) -> &Charset {
        &self.charset
    }

    /// Whether a record is open and waiting for more text.
    #[must_use]
    pub fn has_pending_record(&self) -> bool {
        self.parser.in_record()
    }

    /// Read lines appended since the last read and return the records they
    /// complete, in file order.
    ///
    /// If the file shrank below the watermark it was truncated, and reading
    /// restarts from offset 0. An I/O error in the middle of the read keeps
    /// the records and watermark of the lines read so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or inspected. Nothing is
    /// consumed in that case, so the next read picks up the same span.
    pub async fn read_new_records(&mut self) -> Result<Vec<TraceRecord>, WatcherError> {
        let mut file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WatcherError::FileMissing(self.path.clone()));
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(WatcherError::PermissionDenied(self.path.clone()));
            }
            Err(e) => return Err(WatcherError::Io(e)),
        };

        let file_len = file.metadata().await?.len();

        if file_len < self.watermark {
            tracing::warn!(
                path = %self.path.display(),
                watermark = self.watermark,
                new_len = file_len,
                "Trace file truncated, restarting from offset 0"
            );
            self.watermark = 0;
            self.parser.reset();
        }

        if file_len == self.watermark {
            return Ok(Vec::new());
        }

        file.seek(std::io::SeekFrom::Start(self.watermark)).await?;

        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut line = Vec::new();

        loop {
            line.clear();
            let bytes_read = match reader.read_until(b'\n', &mut line).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        watermark = self.watermark,
                        error = %e,
                        "Trace read interrupted, resuming on next change"
                    );
                    break;
                }
            };

            if bytes_read == 0 || line.last() != Some(&b'\n') {
                break;
            }

            self.watermark += bytes_read as u64;

            let text = self.charset.decode(&line[..bytes_read - 1]);
            if let Some(record) = self.parser.feed_line(&text) {
                records.push(record);
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const START: &str = "PARSING IN CURSOR #7 len=20 dep=0 uid=84 oct=3 lid=84 tim=5001 hv=9 ad='0a' sqlid='g4y6nw3tts7cc'";

    fn append(file: &mut NamedTempFile, text: &str) {
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    #[tokio::test]
    async fn test_reads_initial_content() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, &format!("{START}\nSELECT 1 FROM DUAL\nEND OF STMT\n"));

        let mut tailer = TraceTailer::new(file.path().to_path_buf(), Charset::utf8());
        let records = tailer.read_new_records().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "g4y6nw3tts7cc");
        assert_eq!(records[0].tim, 5001);
        assert_eq!(tailer.watermark(), file.as_file().metadata().unwrap().len());
    }

    #[tokio::test]
    async fn test_reads_only_new_lines() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, &format!("{START}\nSELECT 1 FROM DUAL\nEND OF STMT\n"));

        let mut tailer = TraceTailer::new(file.path().to_path_buf(), Charset::utf8());
        assert_eq!(tailer.read_new_records().await.unwrap().len(), 1);
        let first = tailer.watermark();

        // No new content
        assert!(tailer.read_new_records().await.unwrap().is_empty());
        assert_eq!(tailer.watermark(), first);

        append(&mut file, &format!("{START}\nSELECT 2 FROM DUAL\nEND OF STMT\n"));
        let records = tailer.read_new_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sql, "SELECT 2 FROM DUAL\n");
        assert!(tailer.watermark() > first);
    }

    #[tokio::test]
    async fn test_partial_line_is_not_consumed() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, &format!("{START}\nSELECT 1 FR"));

        let mut tailer = TraceTailer::new(file.path().to_path_buf(), Charset::utf8());
        assert!(tailer.read_new_records().await.unwrap().is_empty());
        assert_eq!(tailer.watermark(), START.len() as u64 + 1);
        assert!(tailer.has_pending_record());

        append(&mut file, "OM DUAL\nEND OF STMT\n");
        let records = tailer.read_new_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sql, "SELECT 1 FROM DUAL\n");
    }

    #[tokio::test]
    async fn test_handles_truncation() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        std::fs::write(
            &path,
            format!("{START}\nSELECT 1 FROM DUAL\nEND OF STMT\n{START}\nSELECT 2\n"),
        )
        .unwrap();

        let mut tailer = TraceTailer::new(path.clone(), Charset::utf8());
        assert_eq!(tailer.read_new_records().await.unwrap().len(), 1);
        let old_watermark = tailer.watermark();

        std::fs::write(&path, format!("{START}\nSELECT 3\nEND OF STMT\n")).unwrap();

        let records = tailer.read_new_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sql, "SELECT 3\n");
        assert!(tailer.watermark() < old_watermark);
    }

    #[tokio::test]
    async fn test_missing_file_leaves_watermark() {
        let path = PathBuf::from("/tmp/nonexistent-trace-12345.trc");
        let mut tailer = TraceTailer::with_watermark(path, Charset::utf8(), 42);

        let result = tailer.read_new_records().await;
        assert!(matches!(result, Err(WatcherError::FileMissing(_))));
        assert_eq!(tailer.watermark(), 42);
    }

    #[tokio::test]
    async fn test_decodes_gbk() {
        let mut file = NamedTempFile::new().unwrap();
        let mut bytes = format!("{START}\nSELECT '").into_bytes();
        // "中文" in GBK
        bytes.extend_from_slice(&[0xD6, 0xD0, 0xCE, 0xC4]);
        bytes.extend_from_slice(b"' FROM DUAL\nEND OF STMT\n");
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let mut tailer = TraceTailer::new(file.path().to_path_buf(), Charset::from_tag("ZHS16GBK"));
        let records = tailer.read_new_records().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sql, "SELECT '中文' FROM DUAL\n");
        assert_eq!(tailer.watermark(), bytes.len() as u64);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let mut file = NamedTempFile::new().unwrap();
        let mut bytes = format!("{START}\nSELECT '").into_bytes();
        bytes.push(0xFF);
        bytes.extend_from_slice(b"'\nEND OF STMT\n");
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let mut tailer = TraceTailer::new(file.path().to_path_buf(), Charset::utf8());
        let records = tailer.read_new_records().await.unwrap();
        assert_eq!(records[0].sql, "SELECT '\u{FFFD}'\n");
    }
}
