//! Simulation telemetry: binary packet codec and UDP receive side

pub mod packet;
pub mod receiver;

pub use receiver::{Capture, TelemetryDiscovery, TelemetryFeed};
