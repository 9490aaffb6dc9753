//! Telemetry receive task and simulation discovery
//!
//! The receive task owns the UDP socket and only decodes. Decoded states go
//! into a single-slot watch cell, so a slow orchestrator drops intermediate
//! frames instead of queueing them.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::shutdown::ShutdownSignal;
use crate::bridge::transport::TargetDiscovery;
use crate::util::rate_limit::LogThrottle;
use crate::util::time::unix_millis;

use super::packet::{self, GameState};

/// Largest datagram we accept (16 enemies fit in 408 bytes)
pub const MAX_DATAGRAM_LEN: usize = 4096;

/// Receive-side counters
#[derive(Debug, Default)]
pub struct ReceiveStats {
    pub packets_received: AtomicU64,
    pub packets_decoded: AtomicU64,
    pub packets_rejected: AtomicU64,
    pub last_tick: AtomicU32,
    pub last_packet_at: AtomicU64,
}

impl ReceiveStats {
    fn record_state(&self, tick: u32) {
        self.packets_decoded.fetch_add(1, Ordering::Relaxed);
        self.last_tick.store(tick, Ordering::Relaxed);
        self.last_packet_at.store(unix_millis(), Ordering::Relaxed);
    }
}

/// Result of sampling the latest-state cell
#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    /// A state not seen by this feed before
    Fresh(GameState),
    /// Nothing new since the previous capture
    Stale,
    /// The receive task has stopped
    Closed,
}

/// Read side of the latest-state cell, handed to the orchestrator on attach
#[derive(Debug, Clone)]
pub struct TelemetryFeed {
    rx: watch::Receiver<Option<GameState>>,
    stats: Arc<ReceiveStats>,
}

impl TelemetryFeed {
    pub fn new(rx: watch::Receiver<Option<GameState>>, stats: Arc<ReceiveStats>) -> Self {
        Self { rx, stats }
    }

    /// Take the newest state, if one arrived since the last capture
    pub fn capture(&mut self) -> Capture {
        match self.rx.has_changed() {
            Ok(true) => match self.rx.borrow_and_update().clone() {
                Some(state) => Capture::Fresh(state),
                None => Capture::Stale,
            },
            Ok(false) => Capture::Stale,
            Err(_) => Capture::Closed,
        }
    }

    pub fn stats(&self) -> &ReceiveStats {
        &self.stats
    }
}

/// Decode-only receive loop; runs until shutdown
pub async fn run_receiver(
    socket: UdpSocket,
    tx: watch::Sender<Option<GameState>>,
    stats: Arc<ReceiveStats>,
    mut shutdown: ShutdownSignal,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    let throttle = LogThrottle::default();

    loop {
        let (len, from) = tokio::select! {
            _ = shutdown.triggered() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "Telemetry socket receive failed");
                    continue;
                }
            },
        };

        stats.packets_received.fetch_add(1, Ordering::Relaxed);

        match packet::decode(&buf[..len]) {
            Ok(state) => {
                stats.record_state(state.tick);
                tx.send_replace(Some(state));
            }
            Err(e) => {
                stats.packets_rejected.fetch_add(1, Ordering::Relaxed);
                if let Some(suppressed) = throttle.check() {
                    warn!(%from, error = %e, suppressed, "Dropping telemetry packet");
                }
            }
        }
    }

    debug!("Telemetry receiver stopped");
}

/// Finds the simulation by listening for its telemetry datagrams
pub struct TelemetryDiscovery {
    addr: SocketAddr,
    attach_timeout: Duration,
    shutdown: ShutdownSignal,
    active: Option<ActiveReceiver>,
}

struct ActiveReceiver {
    rx: watch::Receiver<Option<GameState>>,
    stats: Arc<ReceiveStats>,
    task: JoinHandle<()>,
}

impl TelemetryDiscovery {
    pub fn new(addr: SocketAddr, attach_timeout: Duration, shutdown: ShutdownSignal) -> Self {
        Self {
            addr,
            attach_timeout,
            shutdown,
            active: None,
        }
    }

    async fn ensure_receiver(&mut self) -> Option<&ActiveReceiver> {
        let running = self
            .active
            .as_ref()
            .is_some_and(|active| !active.task.is_finished());

        if !running {
            let socket = match UdpSocket::bind(self.addr).await {
                Ok(socket) => socket,
                Err(e) => {
                    error!(addr = %self.addr, error = %e, "Failed to bind telemetry socket");
                    return None;
                }
            };
            info!(addr = %self.addr, "Listening for telemetry");

            let (tx, rx) = watch::channel(None);
            let stats = Arc::new(ReceiveStats::default());
            let task = tokio::spawn(run_receiver(
                socket,
                tx,
                stats.clone(),
                self.shutdown.clone(),
            ));
            self.active = Some(ActiveReceiver { rx, stats, task });
        }

        self.active.as_ref()
    }
}

impl TargetDiscovery for TelemetryDiscovery {
    fn find_target(&mut self) -> BoxFuture<'_, Option<TelemetryFeed>> {
        Box::pin(async move {
            let attach_timeout = self.attach_timeout;
            let active = self.ensure_receiver().await?;

            // Wait on a clone so the feed below still sees the first state as fresh
            let mut watcher = active.rx.clone();
            let attached = match tokio::time::timeout(
                attach_timeout,
                watcher.wait_for(Option::is_some),
            )
            .await
            {
                Ok(Ok(_)) => true,
                Ok(Err(_)) => false,
                Err(_) => {
                    debug!(timeout = ?attach_timeout, "No telemetry yet");
                    false
                }
            };
            attached.then(|| TelemetryFeed::new(active.rx.clone(), active.stats.clone()))
        })
    }
}

impl Drop for TelemetryDiscovery {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}
