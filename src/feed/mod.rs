//! Follow-mode feed of media server log lines.
//!
//! Starts at the end of the log, survives truncation and rotation, and
//! delivers lines in file order.

mod error;
mod follower;
mod tailer;

pub use error::FeedError;
pub use follower::{
    LogFollower, DEFAULT_CHANNEL_CAPACITY, DEFAULT_DEBOUNCE, DEFAULT_POLL_INTERVAL,
};
pub use tailer::{LogTailer, DEFAULT_MAX_LINE_LEN};
