//! Beacon store daemon (bcnd)
//!
//! Opens the beacon database and periodically removes expired beacons
//! until interrupted.

use async_signals::Signals;
use clap::Parser;
use futures::prelude::*;
use tokio::task;
use tracing::{info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::FmtSubscriber;

use bcn_daemon::engine::{Engine, EngineOptions};
use bcn_daemon::store::{BeaconDb, Context};

#[derive(Debug, Parser)]
#[clap(name = "Beacon Store Daemon")]
/// Persistent beacon store daemon
struct Args {
    #[clap(flatten)]
    engine_opts: EngineOptions,

    #[clap(long, default_value = "debug", env = "LOG_LEVEL")]
    /// Enable verbose logging
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let opts = Args::parse();

    // Quieten diesel statement logging
    let filter = EnvFilter::from_default_env()
        .add_directive(opts.log_level.into())
        .add_directive("diesel=info".parse()?);

    let _ = FmtSubscriber::builder()
        .compact()
        .with_max_level(opts.log_level)
        .with_env_filter(filter)
        .try_init();

    let o = opts.engine_opts;
    info!(
        "Starting beacon store for {} (database: {}, sweep every {})",
        o.local_ia,
        o.database_file,
        humantime::format_duration(o.sweep_interval)
    );

    // Bind exit handler
    let mut signals = Signals::new(vec![libc::SIGINT])?;

    let engine = Engine::new(o)
        .await
        .map_err(|e| anyhow::anyhow!("Error opening beacon store: {:?}", e))?;

    let store = engine.store();
    let sources = task::spawn_blocking(move || store.beacon_sources(&Context::new())).await?;
    match sources {
        Ok(s) => info!("Loaded beacons from {} sources", s.len()),
        Err(e) => warn!("Unable to list beacon sources: {}", e),
    }

    let instance = engine
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Error starting engine: {:?}", e))?;

    let mut exit_tx = instance.exit_tx();
    task::spawn(async move {
        if let Some(sig) = signals.next().await {
            info!("Received signal {}, shutting down", sig);
        }
        let _ = exit_tx.send(()).await;
    });

    // Join stops the sweep task and closes the store
    instance
        .join()
        .await
        .map_err(|e| anyhow::anyhow!("Engine error: {:?}", e))?;

    info!("Beacon store closed");

    Ok(())
}
