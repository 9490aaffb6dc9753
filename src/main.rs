//! Record Bridge - couples a real-time game simulation to a fixed-width
//! record peer
//!
//! This is the main entry point. It wires together:
//! - UDP telemetry discovery and the decode-only receive task
//! - The record peer transport (dataset directory or FTP)
//! - The action scheduler driving the input sink
//! - The orchestrator state machine that owns the polling cycle

mod app;
mod bridge;
mod command;
mod config;
mod records;
mod scheduler;
mod telemetry;
mod util;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::shutdown::{self, ShutdownTrigger};
use crate::app::BridgeContext;
use crate::bridge::{Bridge, EndpointConnector};
use crate::config::Config;
use crate::scheduler::{ActionScheduler, LoggingSink};
use crate::telemetry::TelemetryDiscovery;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting Record Bridge");
    info!(
        telemetry = %config.telemetry_addr,
        endpoint = %config.peer_endpoint,
        encoding = %config.encoding,
        "Configuration loaded"
    );

    let (trigger, signal) = shutdown::channel();
    tokio::spawn(shutdown_signal(trigger));

    // Input injection is external; the default sink logs each primitive
    let (actions, scheduler) =
        ActionScheduler::spawn(Box::new(LoggingSink), config.scheduler_hz, signal.clone());

    let discovery = TelemetryDiscovery::new(
        config.telemetry_addr,
        config.attach_timeout,
        signal.clone(),
    );

    let bridge = Bridge::new(
        BridgeContext::new(config, actions),
        Box::new(discovery),
        Box::new(EndpointConnector),
        signal,
    );

    let stats = bridge.run().await;

    // Dropping the bridge closed the action queue; let the executor drain
    scheduler.await?;

    info!(cycles = stats.cycles, "Bridge shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal(trigger: ShutdownTrigger) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }

    trigger.trigger();
}
