//! Connection lifecycle and the polling cycle
//!
//! `Searching -> Connecting -> Polling`, with failures going to `Retry`
//! (auto-retry on) or `Terminated`. Shutdown forces `Terminated` from any
//! phase.

use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::app::shutdown::ShutdownSignal;
use crate::app::BridgeContext;
use crate::command::CommandAction;
use crate::telemetry::{Capture, TelemetryFeed};
use crate::util::time::{record_date, tick_period, Timer};

use super::transport::{PeerConnection, PeerConnector, TargetDiscovery, TransportError};

/// Cycle statistics are logged this often
const STATS_LOG_INTERVAL: u64 = 50;

/// Where a retry resumes after its backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Searching,
    Connecting,
}

/// Bridge phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgePhase {
    /// Waiting for the simulation's telemetry
    Searching,
    /// Opening the peer transport
    Connecting,
    /// Running exchange cycles
    Polling,
    /// Backing off before resuming
    Retry { resume: Resume },
    /// Absorbing
    Terminated,
}

/// Counters for the polling loop
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleStats {
    pub cycles: u64,
    pub stale_cycles: u64,
    pub records_uploaded: u64,
    pub commands_received: u64,
    pub commands_dropped: u64,
    pub actions_enqueued: u64,
    pub transport_failures: u64,
}

/// How one polling cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    Completed,
    /// No new telemetry since the last cycle
    Stale,
    /// The telemetry receive task stopped
    FeedLost,
}

/// The orchestrator. Owns the context, the capabilities and both data flows.
pub struct Bridge {
    ctx: BridgeContext,
    discovery: Box<dyn TargetDiscovery>,
    connector: Box<dyn PeerConnector>,
    shutdown: ShutdownSignal,
    session_id: Uuid,
    phase: BridgePhase,
    feed: Option<TelemetryFeed>,
    connection: Option<Box<dyn PeerConnection>>,
    stats: CycleStats,
}

impl Bridge {
    pub fn new(
        ctx: BridgeContext,
        discovery: Box<dyn TargetDiscovery>,
        connector: Box<dyn PeerConnector>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            ctx,
            discovery,
            connector,
            shutdown,
            session_id: Uuid::new_v4(),
            phase: BridgePhase::Searching,
            feed: None,
            connection: None,
            stats: CycleStats::default(),
        }
    }

    /// Drive the state machine until it terminates
    pub async fn run(mut self) -> CycleStats {
        let span = info_span!("bridge", session = %self.session_id);
        async move {
            info!(
                endpoint = %self.ctx.config.peer_endpoint,
                tick_rate_hz = self.ctx.config.tick_rate_hz,
                auto_retry = self.ctx.config.auto_retry,
                "Bridge started"
            );

            let mut shutdown = self.shutdown.clone();
            while self.phase != BridgePhase::Terminated {
                if shutdown.is_triggered() {
                    self.transition(BridgePhase::Terminated);
                    break;
                }
                let next = tokio::select! {
                    next = self.step() => next,
                    _ = shutdown.triggered() => BridgePhase::Terminated,
                };
                self.transition(next);
            }

            self.connection = None;
            self.log_stats("Bridge terminated");
            self.stats
        }
        .instrument(span)
        .await
    }

    fn transition(&mut self, next: BridgePhase) {
        if next != self.phase {
            debug!(from = ?self.phase, to = ?next, "Phase change");
            self.phase = next;
        }
    }

    /// Execute the current phase once and return the next phase
    async fn step(&mut self) -> BridgePhase {
        match self.phase {
            BridgePhase::Searching => match self.discovery.find_target().await {
                Some(feed) => {
                    info!("Simulation attached");
                    self.feed = Some(feed);
                    BridgePhase::Connecting
                }
                None => self.on_failure(Resume::Searching, "No simulation found"),
            },

            BridgePhase::Connecting => {
                let deadline = self.ctx.config.transport_timeout;
                let endpoint = self.ctx.config.peer_endpoint.clone();
                let connect = self.connector.connect(&endpoint);
                match with_deadline(deadline, connect, TransportError::ConnectFailed).await {
                    Ok(connection) => {
                        info!(endpoint = %endpoint, "Peer connected");
                        self.connection = Some(connection);
                        BridgePhase::Polling
                    }
                    Err(e) => {
                        warn!(error = %e, "Peer connection failed");
                        self.stats.transport_failures += 1;
                        self.on_failure(Resume::Connecting, "Peer unreachable")
                    }
                }
            }

            BridgePhase::Polling => {
                let outcome = self.poll_cycle().await;
                match outcome {
                    Ok(CycleOutcome::FeedLost) => {
                        warn!("Telemetry feed closed, searching again");
                        self.feed = None;
                        self.connection = None;
                        return BridgePhase::Searching;
                    }
                    Ok(CycleOutcome::Completed) => {
                        self.stats.cycles += 1;
                        if self.stats.cycles % STATS_LOG_INTERVAL == 0 {
                            self.log_stats("Bridge cycle stats");
                        }
                    }
                    Ok(CycleOutcome::Stale) => {
                        self.stats.stale_cycles += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "Transport failed during polling");
                        self.stats.transport_failures += 1;
                        self.connection = None;
                        return self.on_failure(Resume::Connecting, "Lost peer transport");
                    }
                }

                self.shutdown
                    .sleep(tick_period(self.ctx.config.tick_rate_hz))
                    .await;
                BridgePhase::Polling
            }

            BridgePhase::Retry { resume } => {
                let backoff = self.ctx.config.retry_backoff;
                debug!(?backoff, ?resume, "Backing off");
                if !self.shutdown.sleep(backoff).await {
                    return BridgePhase::Terminated;
                }
                match resume {
                    Resume::Searching => BridgePhase::Searching,
                    Resume::Connecting => BridgePhase::Connecting,
                }
            }

            BridgePhase::Terminated => BridgePhase::Terminated,
        }
    }

    fn on_failure(&self, resume: Resume, what: &str) -> BridgePhase {
        if self.ctx.config.auto_retry {
            info!(
                backoff_secs = self.ctx.config.retry_backoff.as_secs(),
                "{what}, will retry"
            );
            BridgePhase::Retry { resume }
        } else {
            warn!("{what}, auto-retry disabled");
            BridgePhase::Terminated
        }
    }

    /// capture -> encode -> upload -> processing delay -> download ->
    /// decode -> translate -> enqueue
    async fn poll_cycle(&mut self) -> Result<CycleOutcome, TransportError> {
        let (Some(feed), Some(connection)) = (self.feed.as_mut(), self.connection.as_mut()) else {
            return Ok(CycleOutcome::FeedLost);
        };

        let state = match feed.capture() {
            Capture::Fresh(state) => state,
            Capture::Stale => return Ok(CycleOutcome::Stale),
            Capture::Closed => return Ok(CycleOutcome::FeedLost),
        };

        let timer = Timer::new();
        let config = &self.ctx.config;
        let codec = &self.ctx.codec;

        let records = codec.encode_game_state(&state, record_date());
        let upload = codec.to_bytes(&records);
        with_deadline(
            config.transport_timeout,
            connection.upload(upload),
            TransportError::WriteFailed,
        )
        .await?;
        self.stats.records_uploaded += records.len() as u64;

        tokio::time::sleep(config.processing_delay).await;

        let download = with_deadline(
            config.transport_timeout,
            connection.download(),
            TransportError::ReadFailed,
        )
        .await?;

        let commands = codec.decode_commands(&download);
        self.stats.commands_received += commands.len() as u64;

        let mut enqueued = 0;
        for cmd in &commands {
            if cmd.action == CommandAction::Unknown {
                warn!(reason = %cmd.reason, "Dropping command with unknown action");
                self.stats.commands_dropped += 1;
                continue;
            }
            match self.ctx.translator.translate(cmd) {
                Ok(actions) => {
                    enqueued += self.ctx.actions.enqueue_all(actions);
                }
                Err(e) => {
                    warn!(error = %e, priority = cmd.priority, reason = %cmd.reason, "Dropping command");
                    self.stats.commands_dropped += 1;
                }
            }
        }
        self.stats.actions_enqueued += enqueued as u64;

        debug!(
            tick = state.tick,
            records = records.len(),
            commands = commands.len(),
            actions = enqueued,
            elapsed_ms = timer.elapsed_ms(),
            "Cycle complete"
        );
        Ok(CycleOutcome::Completed)
    }

    fn log_stats(&self, message: &str) {
        let stats = &self.stats;
        let (packets_decoded, packets_rejected) = self.feed.as_ref().map_or((0, 0), |feed| {
            let received = feed.stats();
            (
                received.packets_decoded.load(Ordering::Relaxed),
                received.packets_rejected.load(Ordering::Relaxed),
            )
        });
        info!(
            cycles = stats.cycles,
            stale_cycles = stats.stale_cycles,
            records_uploaded = stats.records_uploaded,
            commands_received = stats.commands_received,
            commands_dropped = stats.commands_dropped,
            actions_enqueued = stats.actions_enqueued,
            actions_pending = self.ctx.actions.stats().pending(),
            transport_failures = stats.transport_failures,
            packets_decoded,
            packets_rejected,
            "{message}"
        );
    }
}

/// Bound a transport call; a timeout maps to the call's own error kind
async fn with_deadline<T>(
    deadline: Duration,
    call: impl Future<Output = Result<T, TransportError>>,
    on_timeout: fn(String) -> TransportError,
) -> Result<T, TransportError> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(format!("timed out after {deadline:?}"))),
    }
}
