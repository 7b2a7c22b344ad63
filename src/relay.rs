//! Wiring of feed, classifier and controller into the running relay.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, RelayConfig};
use crate::controller::{StateStore, StreamController};
use crate::events::classify;
use crate::feed::{FeedError, LogFollower, LogTailer};
use crate::transcoder::{check_transcoder, CheckError, FfmpegSupervisor, ProcessSupervisor};

/// Fatal relay errors. Each maps to exit code 1.
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Transcoder unavailable: {0}")]
    Transcoder(#[from] CheckError),
    #[error("Cannot open log feed: {0}")]
    Feed(#[from] FeedError),
}

/// Counters reported when the relay stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Lines consumed from the feed.
    pub lines: usize,
    /// Transcoders still running at shutdown and stopped then.
    pub stopped_on_shutdown: usize,
}

/// Apply lines from `lines` until the channel closes or `shutdown` fires.
///
/// Returns the number of lines consumed.
pub async fn drive<P, S>(
    controller: &StreamController<P, S>,
    lines: &mut mpsc::Receiver<String>,
    shutdown: &CancellationToken,
) -> usize
where
    P: ProcessSupervisor,
    S: StateStore<Handle = P::Handle>,
{
    let mut consumed = 0;
    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };
        consumed += 1;
        tracing::trace!(line = %line, "Log line");
        controller.apply(classify(&line)).await;
    }
    consumed
}

/// Run the relay until `shutdown` fires or the feed ends.
///
/// Checks the transcoder and opens the log before doing anything else;
/// either failing aborts the run. Running transcoders are stopped on the
/// way out.
///
/// # Errors
///
/// Returns `RelayError` if a startup precondition fails.
pub async fn run(
    config: &RelayConfig,
    shutdown: CancellationToken,
) -> Result<RelaySummary, RelayError> {
    tracing::info!(binary = %config.transcoder.binary, "Checking transcoder");
    let version = check_transcoder(&config.transcoder.binary).await?;
    tracing::info!(binary = %config.transcoder.binary, version = %version, "Transcoder available");

    let tailer = LogTailer::at_end(config.log_file.clone())
        .await?
        .max_line_len(config.feed.max_line_len);
    tracing::info!(
        path = %config.log_file.display(),
        offset = tailer.offset(),
        "Relay started"
    );

    let controller = StreamController::new(FfmpegSupervisor::new(config.transcoder.clone()));
    let feed_cancel = shutdown.child_token();
    let (feed, mut lines) = LogFollower::new(tailer)
        .poll_interval(config.feed.poll_interval())
        .debounce(config.feed.debounce())
        .spawn(config.feed.channel_capacity, feed_cancel.clone());

    let consumed = drive(&controller, &mut lines, &shutdown).await;

    feed_cancel.cancel();
    drop(lines);
    match feed.await {
        Ok(Ok(()) | Err(FeedError::ChannelClosed)) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Log feed ended with error"),
        Err(e) => tracing::warn!(error = %e, "Log feed task failed"),
    }

    let stopped = controller.shutdown().await;
    Ok(RelaySummary {
        lines: consumed,
        stopped_on_shutdown: stopped,
    })
}
