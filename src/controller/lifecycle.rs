//! Stream lifecycle state machine.
//!
//! Applies classified events one at a time and starts or stops one
//! transcoder per stream path.

use crate::events::StreamEvent;
use crate::transcoder::ProcessSupervisor;

use super::store::{HandleSlot, HandleState, MemoryStore, StateStore, StreamRecord};

/// Lifecycle state of a stream path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamState {
    /// No record.
    #[default]
    Unknown,
    /// Record exists, no transcoder.
    ActiveNoCodec,
    /// Record exists and a transcoder is registered or starting.
    ActiveTranscoding,
}

/// Result of trying to start a transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new transcoder was spawned and registered.
    Started,
    /// A transcoder was already registered or starting.
    AlreadyRunning,
    /// Spawning failed; nothing was registered.
    Failed,
    /// The stream was stopped while spawning; the new process was stopped too.
    Cancelled,
    /// The path has no record, so nothing was started.
    Untracked,
}

/// What applying one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A record was created. `replaced` is true if a stale one existed.
    Opened { path: String, replaced: bool },
    /// Codecs were recorded for a known stream.
    Detected {
        path: String,
        transcoder: StartOutcome,
    },
    /// A known stream was removed. `stopped` is true if a transcoder ran.
    Closed { path: String, stopped: bool },
    /// The event named a path with no record.
    UnknownStream { path: String },
    /// The line carried no event.
    Ignored,
}

/// Drives transcoders from stream lifecycle events.
///
/// Events must be applied by a single worker in arrival order. Stopping a
/// transcoder waits for the process to exit, which holds up later events.
pub struct StreamController<P, S = MemoryStore<<P as ProcessSupervisor>::Handle>>
where
    P: ProcessSupervisor,
    S: StateStore<Handle = P::Handle>,
{
    supervisor: P,
    store: S,
}

impl<P> StreamController<P>
where
    P: ProcessSupervisor,
{
    /// Create a controller with an empty in-memory store.
    #[must_use]
    pub fn new(supervisor: P) -> Self {
        Self::with_store(supervisor, MemoryStore::new())
    }
}

impl<P, S> StreamController<P, S>
where
    P: ProcessSupervisor,
    S: StateStore<Handle = P::Handle>,
{
    /// Create a controller over an existing store.
    #[must_use]
    pub fn with_store(supervisor: P, store: S) -> Self {
        Self { supervisor, store }
    }

    #[must_use]
    pub fn supervisor(&self) -> &P {
        &self.supervisor
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Copy of the record for `path`.
    #[must_use]
    pub fn record(&self, path: &str) -> Option<StreamRecord> {
        self.store.record(path)
    }

    /// Current lifecycle state of `path`.
    #[must_use]
    pub fn state(&self, path: &str) -> StreamState {
        StreamState::from_parts(
            self.store.record(path).is_some(),
            self.store.get_handle(path),
        )
    }

    /// Paths with a record.
    #[must_use]
    pub fn active_paths(&self) -> Vec<String> {
        self.store.record_paths()
    }

    /// Paths with a registered or starting transcoder.
    #[must_use]
    pub fn transcoding_paths(&self) -> Vec<String> {
        self.store.handle_paths()
    }

    /// Apply one classified event.
    pub async fn apply(&self, event: StreamEvent) -> Outcome {
        match event {
            StreamEvent::StreamCreated { path } => self.on_created(path),
            StreamEvent::StreamDestroyed { path } => self.on_destroyed(path).await,
            StreamEvent::PublishingDetected {
                path,
                track_count,
                codecs,
            } => self.on_publishing(path, track_count, &codecs).await,
            StreamEvent::NoMatch => Outcome::Ignored,
        }
    }

    fn on_created(&self, path: String) -> Outcome {
        let replaced = self
            .store
            .upsert_record(StreamRecord::new(path.clone()))
            .is_some();

        if replaced && self.store.get_handle(&path).is_some() {
            tracing::debug!(path = %path, "Stream recreated, keeping its running transcoder");
        }
        tracing::info!(path = %path, replaced, "Stream opened");

        Outcome::Opened { path, replaced }
    }

    async fn on_publishing(&self, path: String, track_count: u32, codecs: &[String]) -> Outcome {
        let mut updated = None;
        self.store.update_record(&path, &mut |record: &mut StreamRecord| {
            record.apply_codecs(track_count, codecs);
            updated = Some(record.clone());
        });

        let Some(record) = updated else {
            tracing::debug!(path = %path, "Publishing detected for unknown stream, ignoring");
            return Outcome::UnknownStream { path };
        };

        tracing::info!(
            path = %path,
            video_codec = %record.video_codec,
            audio_codec = %record.audio_codec,
            has_audio = record.has_audio,
            "Stream detected"
        );

        let transcoder = self.start_transcoding(&path).await;
        Outcome::Detected { path, transcoder }
    }

    async fn on_destroyed(&self, path: String) -> Outcome {
        if self.store.record(&path).is_none() {
            tracing::info!(path = %path, "Stream closed (not tracked)");
            return Outcome::UnknownStream { path };
        }

        let stopped = self.stop_transcoding(&path).await;
        self.store.remove_record(&path);
        tracing::info!(path = %path, "Stream closed");

        Outcome::Closed { path, stopped }
    }

    /// Start a transcoder for `path` unless one is registered or starting.
    ///
    /// Only streams with a record get a transcoder. The slot is reserved
    /// before spawning so that a concurrent start for the same path is
    /// skipped. The lock is not held while spawning.
    pub async fn start_transcoding(&self, path: &str) -> StartOutcome {
        if self.store.record(path).is_none() {
            tracing::debug!(path = %path, "Not starting transcoder for untracked stream");
            return StartOutcome::Untracked;
        }
        if !self.store.reserve_handle(path) {
            tracing::debug!(path = %path, "Transcoder already running");
            return StartOutcome::AlreadyRunning;
        }

        let handle = match self.supervisor.start(path).await {
            Ok(handle) => handle,
            Err(e) => {
                self.store.release_reservation(path);
                tracing::error!(path = %path, error = %e, "Failed to start transcoder");
                return StartOutcome::Failed;
            }
        };

        match self.store.set_handle(path, handle) {
            Ok(()) => {
                tracing::info!(path = %path, "Transcoder started");
                StartOutcome::Started
            }
            Err(orphan) => {
                tracing::warn!(path = %path, "Stream stopped while transcoder was starting");
                if let Err(e) = self.supervisor.stop(orphan).await {
                    tracing::warn!(path = %path, error = %e, "Error while stopping transcoder");
                }
                StartOutcome::Cancelled
            }
        }
    }

    /// Stop and reap the transcoder for `path`, if any.
    ///
    /// The handle leaves the map before the process is signalled, so the map
    /// is clean even when signalling or waiting fails. In that case the OS
    /// process may survive as an orphan. Returns true if a running
    /// transcoder was stopped.
    pub async fn stop_transcoding(&self, path: &str) -> bool {
        let handle = match self.store.remove_handle(path) {
            None => return false,
            Some(HandleSlot::Reserved) => {
                tracing::debug!(path = %path, "Cancelled pending transcoder start");
                return false;
            }
            Some(HandleSlot::Running(handle)) => handle,
        };

        if let Err(e) = self.supervisor.stop(handle).await {
            tracing::warn!(path = %path, error = %e, "Error while stopping transcoder");
        }
        tracing::info!(path = %path, "Transcoder stopped");
        true
    }

    /// Stop every transcoder and forget every stream.
    ///
    /// Returns the number of running transcoders that were stopped.
    pub async fn shutdown(&self) -> usize {
        let mut stopped = 0;
        for path in self.store.handle_paths() {
            if self.stop_transcoding(&path).await {
                stopped += 1;
            }
        }
        for path in self.store.record_paths() {
            self.store.remove_record(&path);
        }
        tracing::info!(stopped, "Controller shut down");
        stopped
    }
}

impl<P, S> std::fmt::Debug for StreamController<P, S>
where
    P: ProcessSupervisor,
    S: StateStore<Handle = P::Handle>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamController")
            .field("active", &self.store.record_paths())
            .field("transcoding", &self.store.handle_paths())
            .finish()
    }
}

impl StreamState {
    /// Derive the state from record presence and handle slot.
    #[must_use]
    pub fn from_parts(has_record: bool, handle: Option<HandleState>) -> Self {
        match (has_record, handle) {
            (false, _) => Self::Unknown,
            (true, None) => Self::ActiveNoCodec,
            (true, Some(_)) => Self::ActiveTranscoding,
        }
    }
}
