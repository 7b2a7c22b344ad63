//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::feed::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_LINE_LEN};
use crate::transcoder::StopSignal;

/// Network endpoint a stream path is appended to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    /// URL scheme, e.g. `rtmp`.
    pub scheme: String,
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    #[must_use]
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Build the URL for a stream path on this endpoint.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}://{}:{}/{}",
            self.scheme,
            self.host,
            self.port,
            path.trim_start_matches('/')
        )
    }
}

fn default_source() -> Endpoint {
    Endpoint::new("rtmp", "rtmp-server", 1935)
}

fn default_sink() -> Endpoint {
    Endpoint::new("rtsp", "rtsp-server", 8554)
}

fn default_binary() -> String {
    "ffmpeg".to_string()
}

fn default_output_format() -> String {
    "rtsp".to_string()
}

/// Configuration for the transcoder processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Transcoder executable, looked up on `PATH` if not absolute.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Container format passed to `-f`.
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Signal used to stop a transcoder.
    #[serde(default)]
    pub stop_signal: StopSignal,
    /// Where the transcoder pulls the stream from.
    #[serde(default = "default_source")]
    pub source: Endpoint,
    /// Where the transcoder republishes the stream.
    #[serde(default = "default_sink")]
    pub sink: Endpoint,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            output_format: default_output_format(),
            stop_signal: StopSignal::default(),
            source: default_source(),
            sink: default_sink(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_max_line_len() -> usize {
    DEFAULT_MAX_LINE_LEN
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

/// Configuration for following the media server log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Fallback interval for checking the log when no change is reported.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long file system events are coalesced before reading.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Longest line held back while waiting for its newline.
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
    /// Lines buffered between the follower and the controller.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl FeedConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
            max_line_len: default_max_line_len(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_log_file() -> PathBuf {
    PathBuf::from("/app/logs/rtmp-server.log")
}

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Media server log file to follow.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            feed: FeedConfig::default(),
            transcoder: TranscoderConfig::default(),
        }
    }
}
