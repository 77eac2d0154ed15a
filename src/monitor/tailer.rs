//! Incremental reader for the monitored access log
//!
//! The tailer remembers a byte cursor into the file. Each poll reads the
//! complete lines appended since the previous poll and advances the cursor
//! past them. A file that shrank below the cursor is treated as rotated and
//! read again from the start.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TailError {
    #[error("failed to open monitored file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read monitored file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Owns the read cursor into the monitored file
#[derive(Debug)]
pub struct FileTailer {
    path: PathBuf,
    cursor: u64,
}

impl FileTailer {
    /// Start at the beginning of the file, so the first poll covers existing content
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cursor: 0,
        }
    }

    /// Start at the current end of the file, ignoring existing content
    pub async fn at_end(path: impl Into<PathBuf>) -> Result<Self, TailError> {
        let path = path.into();
        let len = tokio::fs::metadata(&path)
            .await
            .map_err(|source| TailError::Open {
                path: path.clone(),
                source,
            })?
            .len();
        Ok(Self { path, cursor: len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the first unread byte
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Read every complete line appended since the last poll.
    ///
    /// A trailing line without a newline is left for a later poll. Blank
    /// lines are dropped but still advance the cursor.
    pub async fn poll(&mut self) -> Result<Vec<String>, TailError> {
        let file = File::open(&self.path).await.map_err(|e| self.open_error(e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| self.read_error(e))?
            .len();

        if size < self.cursor {
            info!(
                "Log rotation detected on {} (size {} < cursor {}), reading from start",
                self.path.display(),
                size,
                self.cursor
            );
            self.cursor = 0;
        }

        if size == self.cursor {
            return Ok(Vec::new());
        }

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(self.cursor))
            .await
            .map_err(|e| self.read_error(e))?;

        // Committed only once the whole read succeeded
        let mut cursor = self.cursor;
        let mut lines = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| self.read_error(e))?;
            if read == 0 || buf.last() != Some(&b'\n') {
                break;
            }
            cursor += read as u64;

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
        self.cursor = cursor;

        debug!(
            "Read {} new lines from {} (cursor now {})",
            lines.len(),
            self.path.display(),
            self.cursor
        );
        Ok(lines)
    }

    fn open_error(&self, source: io::Error) -> TailError {
        TailError::Open {
            path: self.path.clone(),
            source,
        }
    }

    fn read_error(&self, source: io::Error) -> TailError {
        TailError::Read {
            path: self.path.clone(),
            source,
        }
    }
}
