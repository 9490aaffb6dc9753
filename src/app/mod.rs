//! Process-level plumbing: shutdown fan-out and the shared bridge context

pub mod shutdown;
pub mod state;

pub use state::BridgeContext;
