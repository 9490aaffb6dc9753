//! FIFO action queue and its single executor

pub mod executor;
pub mod sink;

pub use executor::{ActionQueue, ActionScheduler};
pub use sink::LoggingSink;

/// Lowest and highest executor polling rates accepted
pub const MIN_POLL_HZ: u32 = 20;
pub const MAX_POLL_HZ: u32 = 100;
