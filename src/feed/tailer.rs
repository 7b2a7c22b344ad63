//! Incremental log file tailer.
//!
//! Reads complete lines as they are appended, and starts over when the file
//! is truncated or replaced by rotation.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::error::FeedError;

/// Identifies the file behind a path, so rotation can be told apart from
/// appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
fn file_identity(metadata: &std::fs::Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;

    Some(FileIdentity {
        dev: metadata.dev(),
        ino: metadata.ino(),
    })
}

#[cfg(not(unix))]
fn file_identity(_metadata: &std::fs::Metadata) -> Option<FileIdentity> {
    None
}

/// Longest line held while waiting for its newline. Anything longer is
/// delivered as it stands.
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

/// Incremental line reader that tracks read position.
///
/// The open file is kept between reads. When the path starts pointing at a
/// different file, the old one is read to its end before switching, so
/// lines written just before a rename are not lost.
#[derive(Debug)]
pub struct LogTailer {
    /// Path to the log file.
    path: PathBuf,
    /// File currently being read, if it could be opened.
    file: Option<File>,
    /// Bytes consumed from the current file.
    offset: u64,
    identity: Option<FileIdentity>,
    /// Trailing bytes of a line whose newline has not arrived yet.
    partial: Vec<u8>,
    max_line_len: usize,
}

impl LogTailer {
    /// Create a tailer that reads the file from the beginning.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self::with_offset(path, 0)
    }

    /// Create a tailer starting at a specific offset.
    #[must_use]
    pub fn with_offset(path: PathBuf, offset: u64) -> Self {
        Self {
            path,
            file: None,
            offset,
            identity: None,
            partial: Vec::new(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    /// Open the file and position at its current end.
    ///
    /// Lines already in the file are never delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be read.
    pub async fn at_end(path: PathBuf) -> Result<Self, FeedError> {
        let file = File::open(&path)
            .await
            .map_err(|e| FeedError::from_io(&path, e))?;
        let metadata = file.metadata().await?;

        Ok(Self {
            offset: metadata.len(),
            identity: file_identity(&metadata),
            file: Some(file),
            ..Self::new(path)
        })
    }

    /// Set the longest line held back while waiting for a newline.
    #[must_use]
    pub fn max_line_len(mut self, len: usize) -> Self {
        self.max_line_len = len.max(1);
        self
    }

    /// Get the current byte offset.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Get the path being tailed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read complete lines appended since the last read.
    ///
    /// A missing file (mid-rotation) yields no lines. If the file shrank,
    /// reading restarts from its beginning. If it was replaced, the rest of
    /// the old file comes first, then the new file from its beginning.
    ///
    /// # Errors
    ///
    /// Returns an error on permission problems or other I/O failures.
    pub async fn read_new_lines(&mut self) -> Result<Vec<String>, FeedError> {
        if self.file.is_none() && !self.open_path().await? {
            return Ok(Vec::new());
        }

        let mut lines = self.drain_open_file().await?;

        if self.replaced().await? {
            tracing::info!(path = %self.path.display(), "Log file rotated, reading new file");
            lines.extend(self.take_partial());
            self.file = None;
            self.identity = None;
            self.offset = 0;

            if self.open_path().await? {
                lines.extend(self.drain_open_file().await?);
            }
        }

        Ok(lines)
    }

    /// Reset the offset to the beginning of the file.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.partial.clear();
        self.identity = None;
        self.file = None;
    }

    /// Open whatever file the path names now. Returns false if there is none.
    async fn open_path(&mut self) -> Result<bool, FeedError> {
        match File::open(&self.path).await {
            Ok(file) => {
                let metadata = file.metadata().await?;
                self.identity = file_identity(&metadata);
                self.file = Some(file);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Log file missing, waiting for it");
                Ok(false)
            }
            Err(e) => Err(FeedError::from_io(&self.path, e)),
        }
    }

    /// Whether the path now names a different file than the open one.
    async fn replaced(&self) -> Result<bool, FeedError> {
        if self.identity.is_none() {
            return Ok(false);
        }
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => Ok(file_identity(&metadata) != self.identity),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FeedError::from_io(&self.path, e)),
        }
    }

    async fn drain_open_file(&mut self) -> Result<Vec<String>, FeedError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(Vec::new());
        };

        let file_len = file.metadata().await?.len();
        if file_len < self.offset {
            tracing::warn!(
                path = %self.path.display(),
                old_offset = self.offset,
                new_len = file_len,
                "Log file truncated, resetting offset to 0"
            );
            self.offset = 0;
            self.partial.clear();
        }
        if file_len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(std::io::SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        let read = file.read_to_end(&mut buf).await?;
        self.offset += read as u64;

        Ok(self.split_lines(&buf))
    }

    fn split_lines(&mut self, buf: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(buf);

        let mut lines = match self.partial.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => {
                let rest = self.partial.split_off(last_newline + 1);
                let complete = std::mem::replace(&mut self.partial, rest);
                complete
                    .split(|&b| b == b'\n')
                    .filter_map(decode_line)
                    .collect()
            }
            None => Vec::new(),
        };

        if self.partial.len() > self.max_line_len {
            tracing::warn!(
                path = %self.path.display(),
                len = self.partial.len(),
                "Log line exceeds maximum length, delivering it unterminated"
            );
            lines.extend(self.take_partial());
        }
        lines
    }

    fn take_partial(&mut self) -> Option<String> {
        decode_line(&std::mem::take(&mut self.partial))
    }
}

/// Decode one line without its terminator. Blank lines are dropped.
fn decode_line(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(line).into_owned())
}
