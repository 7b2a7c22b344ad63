//! Stream lifecycle controller and its state store.

mod lifecycle;
mod store;

pub use lifecycle::*;
pub use store::*;
