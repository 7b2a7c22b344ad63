//! Stream records and transcoder handles.
//!
//! The store keeps two independent maps keyed by stream path. Every method
//! is serialized internally; the handle map sits behind one exclusive lock,
//! and reservation makes check-then-start a single critical section.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// In-memory state of one known stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Stream path, e.g. `live/cam1`.
    pub path: String,
    /// First announced codec. Empty until publishing is detected.
    pub video_codec: String,
    /// Second announced codec, if any.
    pub audio_codec: String,
    /// True when exactly two tracks were announced.
    ///
    /// Two video tracks are reported as audio; the track count is all the
    /// server log gives us.
    pub has_audio: bool,
}

impl StreamRecord {
    /// Create a record with no codec information.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Fill in codec fields from a publishing announcement.
    pub fn apply_codecs(&mut self, track_count: u32, codecs: &[String]) {
        self.video_codec = codecs.first().cloned().unwrap_or_default();
        self.audio_codec = codecs.get(1).cloned().unwrap_or_default();
        self.has_audio = track_count == 2;
    }

    /// Whether publishing has been detected for this stream.
    #[must_use]
    pub fn has_codecs(&self) -> bool {
        !self.video_codec.is_empty()
    }
}

/// Observable state of a handle slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// A start is in flight; the handle is not registered yet.
    Reserved,
    /// A transcoder is registered.
    Running,
}

/// Contents of a handle slot.
#[derive(Debug)]
pub enum HandleSlot<H> {
    Reserved,
    Running(H),
}

impl<H> HandleSlot<H> {
    #[must_use]
    pub fn state(&self) -> HandleState {
        match self {
            Self::Reserved => HandleState::Reserved,
            Self::Running(_) => HandleState::Running,
        }
    }

    /// Take the handle out of a running slot.
    #[must_use]
    pub fn into_handle(self) -> Option<H> {
        match self {
            Self::Reserved => None,
            Self::Running(handle) => Some(handle),
        }
    }
}

/// Storage for stream records and transcoder handles.
pub trait StateStore: Send + Sync {
    /// Handle type stored per path.
    type Handle: Send;

    /// Insert or replace the record for `record.path`. Returns the old record.
    fn upsert_record(&self, record: StreamRecord) -> Option<StreamRecord>;

    /// Update the record for `path` in place. Returns false if there is none.
    fn update_record(&self, path: &str, update: &mut dyn FnMut(&mut StreamRecord)) -> bool;

    /// Get a copy of the record for `path`.
    fn record(&self, path: &str) -> Option<StreamRecord>;

    /// Remove and return the record for `path`.
    fn remove_record(&self, path: &str) -> Option<StreamRecord>;

    /// Paths with a record.
    fn record_paths(&self) -> Vec<String>;

    /// State of the handle slot for `path`, if occupied.
    fn get_handle(&self, path: &str) -> Option<HandleState>;

    /// Reserve the handle slot for `path`.
    ///
    /// Returns false, leaving the slot untouched, if it is already occupied.
    fn reserve_handle(&self, path: &str) -> bool;

    /// Register `handle` in a reserved slot.
    ///
    /// Fails, returning the handle, if the reservation was removed in the
    /// meantime or the slot already holds a handle.
    fn set_handle(&self, path: &str, handle: Self::Handle) -> Result<(), Self::Handle>;

    /// Drop a reservation left by a failed start. Running handles are kept.
    fn release_reservation(&self, path: &str) -> bool;

    /// Empty the handle slot for `path`.
    fn remove_handle(&self, path: &str) -> Option<HandleSlot<Self::Handle>>;

    /// Paths with an occupied handle slot.
    fn handle_paths(&self) -> Vec<String>;
}

/// Mutex-backed in-memory store.
#[derive(Debug)]
pub struct MemoryStore<H> {
    records: Mutex<HashMap<String, StreamRecord>>,
    handles: Mutex<HashMap<String, HandleSlot<H>>>,
}

impl<H> MemoryStore<H> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, StreamRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<String, HandleSlot<H>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<H> Default for MemoryStore<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Send> StateStore for MemoryStore<H> {
    type Handle = H;

    fn upsert_record(&self, record: StreamRecord) -> Option<StreamRecord> {
        self.records().insert(record.path.clone(), record)
    }

    fn update_record(&self, path: &str, update: &mut dyn FnMut(&mut StreamRecord)) -> bool {
        match self.records().get_mut(path) {
            Some(record) => {
                update(record);
                true
            }
            None => false,
        }
    }

    fn record(&self, path: &str) -> Option<StreamRecord> {
        self.records().get(path).cloned()
    }

    fn remove_record(&self, path: &str) -> Option<StreamRecord> {
        self.records().remove(path)
    }

    fn record_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.records().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn get_handle(&self, path: &str) -> Option<HandleState> {
        self.handles().get(path).map(HandleSlot::state)
    }

    fn reserve_handle(&self, path: &str) -> bool {
        let mut handles = self.handles();
        if handles.contains_key(path) {
            return false;
        }
        handles.insert(path.to_string(), HandleSlot::Reserved);
        true
    }

    fn set_handle(&self, path: &str, handle: H) -> Result<(), H> {
        let mut handles = self.handles();
        match handles.get_mut(path) {
            Some(slot) if matches!(slot, HandleSlot::Reserved) => {
                *slot = HandleSlot::Running(handle);
                Ok(())
            }
            _ => Err(handle),
        }
    }

    fn release_reservation(&self, path: &str) -> bool {
        let mut handles = self.handles();
        if matches!(handles.get(path), Some(HandleSlot::Reserved)) {
            handles.remove(path);
            return true;
        }
        false
    }

    fn remove_handle(&self, path: &str) -> Option<HandleSlot<H>> {
        self.handles().remove(path)
    }

    fn handle_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.handles().keys().cloned().collect();
        paths.sort();
        paths
    }
}
