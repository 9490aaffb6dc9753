//! Orchestration between the simulation and the record peer

pub mod dataset;
pub mod endpoint;
pub mod ftp;
pub mod orchestrator;
pub mod transport;

pub use endpoint::EndpointConnector;
pub use orchestrator::Bridge;
