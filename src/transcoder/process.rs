//! Transcoder process spawning and control.
//!
//! This module provides a builder for the stream-copy invocation and a
//! wrapper around the running child process.

use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};

use crate::config::TranscoderConfig;

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The binary was not found.
    #[error("Transcoder binary not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(binary: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(binary.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(binary.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Builder for a stream-copy transcoder invocation.
#[derive(Debug, Clone)]
pub struct TranscoderCommand {
    binary: String,
    input: String,
    output: String,
    format: String,
}

impl TranscoderCommand {
    /// Create a command copying `input` to `output` with the default
    /// binary (`ffmpeg`) and format (`rtsp`).
    #[must_use]
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            input: input.into(),
            output: output.into(),
            format: "rtsp".to_string(),
        }
    }

    /// Build the command for a stream path from configuration.
    #[must_use]
    pub fn for_path(config: &TranscoderConfig, path: &str) -> Self {
        Self::new(config.source.url_for(path), config.sink.url_for(path))
            .binary(config.binary.clone())
            .format(config.output_format.clone())
    }

    /// Set the transcoder binary.
    #[must_use]
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the output container format.
    #[must_use]
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    #[must_use]
    pub fn get_binary(&self) -> &str {
        &self.binary
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Build the command-line arguments.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.input.clone(),
            "-c".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            self.format.clone(),
            self.output.clone(),
        ]
    }
}

/// A running transcoder process.
#[derive(Debug)]
pub struct TranscoderProcess {
    child: Child,
}

impl TranscoderProcess {
    /// Spawn the process described by `command`.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(command: &TranscoderCommand) -> Result<Self, SpawnError> {
        Self::spawn_with_args(&command.binary, &command.build_args())
    }

    /// Spawn an arbitrary binary with discarded stdio (for testing).
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn_with_args(binary: &str, args: &[String]) -> Result<Self, SpawnError> {
        let child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SpawnError::from_io(binary, e))?;

        Ok(Self { child })
    }

    /// Get the process ID, if not yet reaped.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit and reap it.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Send SIGKILL (or the platform equivalent) without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    pub fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    /// Send SIGTERM without waiting.
    ///
    /// On non-Unix platforms this falls back to [`Self::start_kill`].
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    pub fn start_terminate(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let Some(pid) = self.id() else {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "process already exited",
                ));
            };
            let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
            kill(nix_pid, Signal::SIGTERM).map_err(std::io::Error::from)
        }

        #[cfg(not(unix))]
        {
            self.start_kill()
        }
    }
}
