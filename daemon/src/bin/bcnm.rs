//! Beacon store management tool (bcnm)
//!
//! Inspects and maintains a beacon database directly.

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::FmtSubscriber;

use bcn_core::prelude::*;
use bcn_daemon::engine::EngineOptions;
use bcn_daemon::store::{BeaconDb, BeaconStore, Context};

#[derive(Debug, Parser)]
#[clap(name = "Beacon Store Manager")]
/// Inspect and maintain a beacon database
struct Args {
    #[clap(subcommand)]
    cmd: Commands,

    #[clap(flatten)]
    engine_opts: EngineOptions,

    #[clap(long, default_value = "warn", env = "LOG_LEVEL")]
    /// Enable verbose logging
    log_level: LevelFilter,
}

#[derive(Debug, Parser)]
enum Commands {
    /// List domains stored beacons originate from
    Sources,

    /// List candidate beacons for propagation or registration
    Candidates {
        #[clap(long, default_value_t = 10)]
        /// Maximum number of beacons to return
        max: usize,

        #[clap(long, default_value_t = Usage::empty())]
        /// Required usage flags (comma separated, eg. `up_reg,prop`)
        usage: Usage,

        #[clap(long)]
        /// Only return beacons originating from this domain
        src: Option<IsdAs>,

        #[clap(long, value_parser = parse_time)]
        /// Reference time for expiry (RFC3339), defaults to now
        at: Option<DateTime<Utc>>,
    },

    /// Remove expired beacons
    Expire {
        #[clap(long, value_parser = parse_time)]
        /// Reference time for expiry (RFC3339), defaults to now
        at: Option<DateTime<Utc>>,
    },
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, humantime::TimestampError> {
    let t: SystemTime = humantime::parse_rfc3339_weak(s)?;
    Ok(t.into())
}

fn main() -> Result<(), anyhow::Error> {
    // Fetch arguments
    let opts = Args::parse();

    // Initialise logging
    let filter = EnvFilter::from_default_env().add_directive(opts.log_level.into());

    let _ = FmtSubscriber::builder()
        .compact()
        .with_max_level(opts.log_level)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let o = &opts.engine_opts;

    debug!("Opening store: {}", o.database_file);
    let store = BeaconStore::new(&o.database_file, o.local_ia, o.store_options.clone())
        .map_err(|e| anyhow::anyhow!("Error opening store '{}': {}", o.database_file, e))?;

    match opts.cmd {
        Commands::Sources => {
            let sources = store.beacon_sources(&Context::new())?;

            for s in &sources {
                println!("{s}");
            }
        }
        Commands::Candidates {
            max,
            usage,
            src,
            at,
        } => {
            let mut ctx = Context::new();
            if let Some(t) = at {
                ctx = ctx.with_now(t);
            }

            let beacons = store.candidate_beacons(&ctx, max, usage, src)?;

            for b in &beacons {
                match b {
                    Ok(b) => print_beacon(b),
                    Err(e) => warn!("Skipping invalid beacon: {}", e),
                }
            }
        }
        Commands::Expire { at } => {
            let ctx = Context::new();
            let now = at.unwrap_or_else(|| ctx.now());

            let n = store.delete_expired(&ctx, now)?;

            println!("Removed {n} expired beacons");
        }
    }

    store.close()?;

    Ok(())
}

fn print_beacon(b: &Beacon) {
    let s = &b.segment;

    let path: Vec<_> = s.as_entries.iter().map(|e| e.local.to_string()).collect();
    let expiry = s
        .max_expiry()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|_| "invalid".to_string());

    println!(
        "{} if: {} hops: {} info: {} expiry: {} path: {}",
        s.id(),
        b.in_if_id,
        s.hop_count(),
        s.info.timestamp.to_rfc3339(),
        expiry,
        path.join(" > ")
    );
}
