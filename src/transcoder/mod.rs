//! Transcoder processes: invocation, supervision and the startup check.

mod check;
mod process;
mod supervisor;

pub use check::*;
pub use process::*;
pub use supervisor::*;
