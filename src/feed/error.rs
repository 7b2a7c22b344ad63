//! Feed error types.

use std::path::PathBuf;

/// Errors that can occur while following the log.
#[derive(thiserror::Error, Debug)]
pub enum FeedError {
    /// Log file does not exist.
    #[error("Log file not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied accessing file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// File watcher error.
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The line receiver was dropped.
    #[error("Channel closed")]
    ChannelClosed,
}

impl FeedError {
    /// Create a `FeedError` from an I/O error on `path`, classifying common
    /// cases.
    pub(crate) fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }
}
