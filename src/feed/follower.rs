//! Follow-mode line feed.
//!
//! Reads a [`LogTailer`] whenever the log's directory reports a change, and
//! on a slow timer as a fallback, forwarding lines in file order over a
//! bounded channel.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use notify_debouncer_full::{new_debouncer, notify::RecursiveMode, DebounceEventResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::error::FeedError;
use super::tailer::LogTailer;

/// Default interval between fallback polls of the log file.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default time file system events are coalesced before the log is read.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Default number of lines buffered between follower and consumer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Follows a log file and forwards new lines.
#[derive(Debug)]
pub struct LogFollower {
    tailer: LogTailer,
    poll_interval: Duration,
    debounce: Duration,
}

impl LogFollower {
    #[must_use]
    pub fn new(tailer: LogTailer) -> Self {
        Self {
            tailer,
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Set the fallback polling interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set how long file system events are coalesced.
    #[must_use]
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Run the follower on a background task.
    ///
    /// Returns the task handle and the receiving end of the line channel.
    #[must_use]
    pub fn spawn(
        self,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (JoinHandle<Result<(), FeedError>>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(self.run(tx, cancel));
        (handle, rx)
    }

    /// Read until cancelled, sending every new line to `tx`.
    ///
    /// If the directory watcher cannot be set up, the follower keeps going
    /// on the fallback timer alone. Read errors are logged and retried on the
    /// next wake-up, so a log that is briefly unreadable during rotation does
    /// not end the feed.
    ///
    /// # Errors
    ///
    /// Returns `FeedError::ChannelClosed` if the receiver is dropped.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<(), FeedError> {
        let (_watcher, mut changes) = match watch_log(self.tailer.path(), self.debounce) {
            Ok((watcher, changes)) => (Some(watcher), Some(changes)),
            Err(e) => {
                tracing::warn!(
                    path = %self.tailer.path().display(),
                    error = %e,
                    "Cannot watch log directory, polling only"
                );
                (None, None)
            }
        };

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            path = %self.tailer.path().display(),
            offset = self.tailer.offset(),
            watching = changes.is_some(),
            "Following log file"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
                Some(()) = next_change(&mut changes) => {
                    if let Some(rx) = changes.as_mut() {
                        while rx.try_recv().is_ok() {}
                    }
                }
            }

            let lines = match self.tailer.read_new_lines().await {
                Ok(lines) => lines,
                Err(e) => {
                    tracing::warn!(
                        path = %self.tailer.path().display(),
                        error = %e,
                        "Failed to read log file"
                    );
                    continue;
                }
            };

            for line in lines {
                tokio::select! {
                    () = cancel.cancelled() => return Ok(()),
                    sent = tx.send(line) => {
                        if sent.is_err() {
                            return Err(FeedError::ChannelClosed);
                        }
                    }
                }
            }
        }
    }
}

async fn next_change(changes: &mut Option<mpsc::UnboundedReceiver<()>>) -> Option<()> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Watch the directory holding `path` and signal whenever an event touches
/// the log's file name. Renames report the old name, so rotation wakes the
/// follower too.
fn watch_log(
    path: &Path,
    debounce: Duration,
) -> Result<(impl Sized + Send, mpsc::UnboundedReceiver<()>), FeedError> {
    let (change_tx, change_rx) = mpsc::unbounded_channel();
    let file_name: Option<OsString> = path.file_name().map(OsString::from);

    let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
        match result {
            Ok(events) => {
                let touched = events.iter().any(|event| {
                    event.paths.iter().any(|p| {
                        file_name
                            .as_deref()
                            .map_or(true, |name| p.file_name() == Some(name))
                    })
                });
                if touched {
                    let _ = change_tx.send(());
                }
            }
            Err(errors) => {
                for error in errors {
                    tracing::warn!(error = %error, "Log watcher error");
                }
            }
        }
    })?;

    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    debouncer.watch(dir, RecursiveMode::NonRecursive)?;

    Ok((debouncer, change_rx))
}
