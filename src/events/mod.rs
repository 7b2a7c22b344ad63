//! Event classification for media server log lines.
//!
//! Turns raw log text into typed stream lifecycle events.

mod classifier;

pub use classifier::*;
