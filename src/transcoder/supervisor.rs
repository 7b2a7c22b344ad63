//! Process supervision seam between the controller and real processes.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::process::{SpawnError, TranscoderCommand, TranscoderProcess};
use crate::config::TranscoderConfig;

/// Signal used to stop a transcoder before reaping it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopSignal {
    /// SIGKILL. The process cannot ignore it.
    #[default]
    Kill,
    /// SIGTERM. Lets ffmpeg flush, but a process that ignores it is waited
    /// on indefinitely.
    Term,
}

/// Error type for stopping a transcoder.
///
/// The process is always waited on, even when signalling fails, so either
/// variant means cleanup was still attempted.
#[derive(thiserror::Error, Debug)]
pub enum StopError {
    /// The termination signal could not be delivered.
    #[error("Failed to signal transcoder: {0}")]
    Signal(#[source] std::io::Error),
    /// Reaping the process failed.
    #[error("Failed to wait for transcoder: {0}")]
    Wait(#[source] std::io::Error),
}

/// Starts and stops transcoders for stream paths.
///
/// `stop` blocks until the process is reaped. There is no timeout, so a
/// process that never exits stalls the caller.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Handle to a running transcoder.
    type Handle: Send;

    /// Start a transcoder for `path`.
    async fn start(&self, path: &str) -> Result<Self::Handle, SpawnError>;

    /// Signal the transcoder and wait for it to exit.
    async fn stop(&self, handle: Self::Handle) -> Result<(), StopError>;
}

/// A transcoder bound to one stream path.
#[derive(Debug)]
pub struct TranscoderHandle {
    path: String,
    process: TranscoderProcess,
    started_at: Instant,
}

impl TranscoderHandle {
    #[must_use]
    pub fn new(path: impl Into<String>, process: TranscoderProcess) -> Self {
        Self {
            path: path.into(),
            process,
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.process.id()
    }

    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Get mutable access to the underlying process.
    pub fn process_mut(&mut self) -> &mut TranscoderProcess {
        &mut self.process
    }
}

/// Supervises ffmpeg stream-copy processes.
#[derive(Debug, Clone)]
pub struct FfmpegSupervisor {
    config: TranscoderConfig,
}

impl FfmpegSupervisor {
    #[must_use]
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    /// Build the invocation for a stream path.
    #[must_use]
    pub fn command_for(&self, path: &str) -> TranscoderCommand {
        TranscoderCommand::for_path(&self.config, path)
    }

    /// Signal and reap a process directly.
    ///
    /// The wait happens even if signalling fails. A wait error takes
    /// precedence over a signal error.
    ///
    /// # Errors
    ///
    /// Returns `StopError` if signalling or waiting failed.
    pub async fn stop_process(
        process: &mut TranscoderProcess,
        signal: StopSignal,
    ) -> Result<(), StopError> {
        let signalled = match signal {
            StopSignal::Kill => process.start_kill(),
            StopSignal::Term => process.start_terminate(),
        };

        let status = process.wait().await.map_err(StopError::Wait)?;
        tracing::debug!(status = %status, "Transcoder exited");

        signalled.map_err(StopError::Signal)
    }
}

impl Default for FfmpegSupervisor {
    fn default() -> Self {
        Self::new(TranscoderConfig::default())
    }
}

#[async_trait]
impl ProcessSupervisor for FfmpegSupervisor {
    type Handle = TranscoderHandle;

    async fn start(&self, path: &str) -> Result<TranscoderHandle, SpawnError> {
        let command = self.command_for(path);
        tracing::debug!(
            path = %path,
            binary = %command.get_binary(),
            input = %command.input(),
            output = %command.output(),
            "Spawning transcoder"
        );
        let process = TranscoderProcess::spawn(&command)?;
        Ok(TranscoderHandle::new(path, process))
    }

    async fn stop(&self, mut handle: TranscoderHandle) -> Result<(), StopError> {
        tracing::debug!(
            path = %handle.path(),
            pid = ?handle.pid(),
            uptime_secs = handle.started_at().elapsed().as_secs(),
            "Stopping transcoder"
        );
        Self::stop_process(handle.process_mut(), self.config.stop_signal).await
    }
}
