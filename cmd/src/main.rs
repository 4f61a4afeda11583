//! Battery cycler rack gateway daemon.
//!
//! This is the main binary for running the gateway: it holds one TCP link
//! per cycler board, feeds decoded telemetry into the channel registry,
//! and exposes the command path used to drive channels.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use cycler_control::CommandRouter;
use cycler_link::{start_reporter, LinkEvent, LinkManager};
use cycler_registry::ChannelRegistry;
use cycler_wire::{CommandKind, BOARD_COUNT};

mod config;

use config::GatewayConfig;

/// Gateway daemon for a 32-board battery cycler rack
#[derive(Parser, Debug)]
#[command(name = "cyclerd", version, about = "Battery cycler rack gateway")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the configured connect timeout, e.g. 5s
    #[arg(long)]
    connect_timeout: Option<humantime::Duration>,

    /// Override the configured idle timeout, e.g. 30s
    #[arg(long)]
    idle_timeout: Option<humantime::Duration>,

    /// Issue a start command to every channel once links are up
    #[arg(long)]
    start_all: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("cyclerd={}", args.log_level).parse()?)
        .add_directive(format!("cycler_wire={}", args.log_level).parse()?)
        .add_directive(format!("cycler_registry={}", args.log_level).parse()?)
        .add_directive(format!("cycler_link={}", args.log_level).parse()?)
        .add_directive(format!("cycler_control={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!("Starting cycler gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = GatewayConfig::load_from_file(&args.config)?;
    let mut link_config = config.link_config();
    if let Some(connect_timeout) = args.connect_timeout {
        link_config.connect_timeout = Duration::from(connect_timeout);
    }
    if let Some(idle_timeout) = args.idle_timeout {
        link_config.idle_timeout = Duration::from(idle_timeout);
    }

    let registry = Arc::new(ChannelRegistry::new());
    let (event_tx, mut event_rx) = mpsc::channel::<LinkEvent>(1024);
    let link = Arc::new(LinkManager::new(link_config, registry.clone(), event_tx));
    let router = CommandRouter::new(link.clone());

    let shutdown = CancellationToken::new();
    let reporter = start_reporter(link.stats(), config.stats_interval(), shutdown.child_token());
    let reading_logger = spawn_reading_logger(&registry, shutdown.child_token());

    link.start().await;

    if args.start_all {
        let report = router.broadcast(CommandKind::Start).await;
        info!(
            "start broadcast reached {}/{} channels",
            report.sent, report.attempted
        );
    }

    let mut health = tokio::time::interval(config.health_interval());
    health.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGINT handler: {}", e))?;

    info!("Gateway started. Waiting for events...");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
                break;
            }

            Some(event) = event_rx.recv() => match event {
                LinkEvent::Connected { board, peer } => {
                    info!("board {} online at {}", board, peer);
                }
                LinkEvent::Disconnected { board } => {
                    info!("board {} offline", board);
                }
                LinkEvent::Faulted { board } => {
                    warn!("board {} faulted; operator restart required", board);
                }
            },

            _ = health.tick() => {
                info!(
                    "connected boards: {}/{}",
                    link.connected_count(),
                    BOARD_COUNT
                );
                let faulted = link.faulted_boards();
                if !faulted.is_empty() {
                    let list: Vec<String> = faulted.iter().map(ToString::to_string).collect();
                    warn!("faulted boards: {}", list.join(", "));
                }
            }
        }
    }

    shutdown.cancel();
    link.stop().await;
    reporter.await.ok();
    reading_logger.await.ok();

    let totals = link.stats().snapshot();
    info!(
        "Final counters: {} frames in, {} readings stored, {} frames sent, {} reconnects",
        totals.frames_in, totals.readings_stored, totals.frames_out, totals.reconnects
    );
    info!("Gateway shutdown complete");
    Ok(())
}

/// Log every registry update at debug level.
///
/// Runs as an ordinary registry subscriber; when logging cannot keep up it
/// skips ahead rather than slowing the receive path.
fn spawn_reading_logger(registry: &ChannelRegistry, shutdown: CancellationToken) -> JoinHandle<()> {
    let mut updates = registry.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                update = updates.recv() => match update {
                    Ok(update) => {
                        let reading = &update.reading;
                        debug!(
                            "channel {}: {:.4} V {:.4} A step {} cycle {}",
                            reading.channel,
                            reading.voltage,
                            reading.current,
                            reading.step_number,
                            reading.cycle_number
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("reading logger lagged, skipped {} updates", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}
