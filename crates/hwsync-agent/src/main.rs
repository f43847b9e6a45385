//! hwsyncd entry point.
//!
//! Wires a vendor backend for the selected ASIC family to the apply loop and
//! the stats poller, applies the initial state and runs until interrupted.

use clap::Parser;
use hwsync_agent::daemon::{load_state_file, StatsPoller, StatsPollerConfig};
use hwsync_agent::stats::{LogMetricsSink, StatUpdater, StatUpdaterConfig};
use hwsync_agent::HwSwitch;
use hwsync_hal::{AsicFamily, FakeBackend, VendorBackend};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Switch hardware synchronization daemon
#[derive(Parser, Debug)]
#[command(name = "hwsyncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ASIC family (fake, trident2, tomahawk, tomahawk3)
    #[arg(short = 'a', long, default_value = "fake")]
    asic: AsicFamily,

    /// Counter polling interval in milliseconds
    #[arg(short = 'p', long, default_value = "1000")]
    poll_interval: u64,

    /// Samples kept per counter for rate computation
    #[arg(long, default_value = "60")]
    rate_window: usize,

    /// JSON file with the initial switch state
    #[arg(short = 's', long)]
    state_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    info!("====================================================================");
    info!("Starting hwsyncd");
    info!("====================================================================");
    info!("ASIC family: {}", args.asic);
    info!("Poll interval: {}ms", args.poll_interval);
    if let Some(ref path) = args.state_file {
        info!("State file: {}", path.display());
    }

    if args.asic != AsicFamily::Fake {
        warn!(
            "no SDK adapter linked, simulating {} with the in-memory backend",
            args.asic
        );
    }
    let backend: Arc<dyn VendorBackend> = Arc::new(FakeBackend::new(args.asic));

    let stats = Arc::new(StatUpdater::with_config(
        Arc::clone(&backend),
        Arc::new(LogMetricsSink),
        StatUpdaterConfig {
            rate_window: args.rate_window,
            ..StatUpdaterConfig::default()
        },
    ));
    let mut switch = HwSwitch::new(Arc::clone(&backend), Arc::clone(&stats));

    if let Some(path) = args.state_file.as_deref() {
        let state = match load_state_file(path) {
            Ok(state) => state,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        };
        match switch.apply_state(Arc::new(state)) {
            Ok(summary) => info!(
                "initial state applied: {} routes, {} acl stats",
                summary.routes_added, summary.acl_stats_added
            ),
            Err(e) => {
                error!("failed to apply initial state: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = StatsPoller::new(
        Arc::clone(&stats),
        StatsPollerConfig {
            interval: Duration::from_millis(args.poll_interval.max(1)),
            ..StatsPollerConfig::default()
        },
    )
    .spawn(shutdown_rx);

    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("Received SIGINT, shutting down gracefully..."),
        Err(err) => error!("Failed to listen for ctrl-c: {}", err),
    }
    // The poller may already be gone; nothing to signal then.
    let _ = shutdown_tx.send(true);

    match poller.await {
        Ok(polls) => info!("stats poller finished after {} polls", polls),
        Err(e) => error!("stats poller task failed: {}", e),
    }

    info!(
        "final state: {} routes, {} next-hop groups, {} counters",
        switch.route_manager().route_count(),
        switch.route_manager().next_hop_group_count(),
        stats.get_counter_count()
    );
    info!("====================================================================");
    info!("hwsyncd shutdown complete");
    info!("====================================================================");

    ExitCode::SUCCESS
}
