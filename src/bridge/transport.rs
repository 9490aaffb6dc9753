//! Capabilities the orchestrator consumes: simulation discovery and the
//! record-exchange channel to the peer

use futures::future::BoxFuture;

use crate::telemetry::TelemetryFeed;

/// Transport failures; all of them go through the retry/terminate policy
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// Locates the running simulation and attaches to its telemetry
pub trait TargetDiscovery: Send {
    /// `None` if no simulation is reachable right now
    fn find_target(&mut self) -> BoxFuture<'_, Option<TelemetryFeed>>;
}

/// Opens connections to the record peer
pub trait PeerConnector: Send {
    fn connect<'a>(
        &'a mut self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn PeerConnection>, TransportError>>;
}

/// One open exchange with the peer
pub trait PeerConnection: Send {
    /// Hand over a batch of encoded records (a multiple of 80 bytes)
    fn upload(&mut self, records: Vec<u8>) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Take whatever command records the peer has produced; empty if none
    fn download(&mut self) -> BoxFuture<'_, Result<Vec<u8>, TransportError>>;
}
