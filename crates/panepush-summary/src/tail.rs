//! Incremental reader for the append-only summary log.
//!
//! Tracks a byte offset and the trailing partial line, and detects
//! truncation/rotation when the file shrinks below the offset.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

/// Result of one incremental read.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TailRead {
    /// The file shrank since the last read; everything derived from earlier
    /// reads is stale.
    pub reset: bool,
    /// Complete, non-empty lines (without the trailing newline).
    pub lines: Vec<String>,
}

#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    /// Bytes consumed so far, including any buffered partial line.
    offset: u64,
    /// Bytes after the last newline seen; kept until the line completes.
    partial: Vec<u8>,
}

impl LogTail {
    /// Tail `path` from byte 0.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            partial: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read bytes appended since the previous call.
    ///
    /// IO failures (including a missing file) are logged and reported as
    /// "nothing new"; the offset is left untouched so the next call retries.
    pub async fn read_new(&mut self) -> TailRead {
        let size = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "summary log unavailable");
                return TailRead::default();
            }
        };

        let mut out = TailRead::default();
        if size < self.offset {
            debug!(
                path = %self.path.display(),
                size,
                offset = self.offset,
                "summary log shrank; re-reading from start"
            );
            self.offset = 0;
            self.partial.clear();
            out.reset = true;
        }
        if size == self.offset {
            return out;
        }

        let chunk = match self.read_range(self.offset, size - self.offset).await {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    offset = self.offset,
                    error = %e,
                    "failed to read summary log"
                );
                return out;
            }
        };
        self.offset += chunk.len() as u64;
        self.partial.extend_from_slice(&chunk);

        if let Some(last_newline) = self.partial.iter().rposition(|b| *b == b'\n') {
            let rest = self.partial.split_off(last_newline + 1);
            let complete = std::mem::replace(&mut self.partial, rest);
            out.lines = complete
                .split(|b| *b == b'\n')
                .map(|raw| String::from_utf8_lossy(raw).trim_end_matches('\r').to_owned())
                .filter(|line| !line.trim().is_empty())
                .collect();
        }

        out
    }

    async fn read_range(&self, start: u64, len: u64) -> std::io::Result<Vec<u8>> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(start)).await?;
        let mut buf = Vec::new();
        file.take(len).read_to_end(&mut buf).await?;
        Ok(buf)
    }
}
