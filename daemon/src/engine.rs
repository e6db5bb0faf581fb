use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::channel::mpsc;
use futures::{prelude::*, select};
use home::home_dir;
use tokio::task::{self, JoinHandle};
use tokio::time::interval;
use tracing::{debug, error, info, span, trace, warn, Level};

use bcn_core::types::IsdAs;

use crate::error::Error;
use crate::store::*;

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct EngineOptions {
    #[clap(
        long = "database-file",
        default_value_t = EngineOptions::default().database_file,
        env = "BCN_DB_FILE"
    )]
    /// Database file for beacon storage
    pub database_file: String,

    #[clap(long = "local-ia", default_value_t = IsdAs::default(), env = "BCN_LOCAL_IA")]
    /// Local ISD-AS, recorded against stored beacons
    pub local_ia: IsdAs,

    #[clap(long, value_parser = humantime::parse_duration, default_value = "30s")]
    /// Interval between expired beacon sweeps
    pub sweep_interval: Duration,

    #[clap(long, value_parser = humantime::parse_duration, default_value = "10s")]
    /// Deadline for each sweep, including the wait for the store lock
    pub sweep_timeout: Duration,

    #[clap(flatten)]
    pub store_options: StoreOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        // Resolve home dir if available
        let h = match home_dir() {
            Some(h) => h.join(".bcnd/"),
            None => PathBuf::from("/var/bcnd/"),
        };

        let database_file = h.join("beacons.db");

        Self {
            database_file: database_file.to_string_lossy().to_string(),
            local_ia: IsdAs::default(),
            sweep_interval: Duration::from_secs(30),
            sweep_timeout: Duration::from_secs(10),
            store_options: StoreOptions::default(),
        }
    }
}

/// Beacon store maintenance engine
pub struct Engine {
    store: Arc<BeaconStore>,
    options: EngineOptions,
}

impl Engine {
    /// Create a new engine, opening or creating the beacon database
    pub async fn new(options: EngineOptions) -> Result<Self, Error> {
        info!(
            "Creating / connecting to database: {}",
            options.database_file
        );

        // Ensure directory exists
        if let Some(p) = PathBuf::from(&options.database_file).parent() {
            if !p.as_os_str().is_empty() && !p.exists() {
                std::fs::create_dir_all(p)?;
            }
        }

        let store = BeaconStore::new(
            &options.database_file,
            options.local_ia,
            options.store_options.clone(),
        )?;

        info!("Engine created for {}", options.local_ia);

        Ok(Self {
            store: Arc::new(store),
            options,
        })
    }

    /// Shared handle to the beacon store
    pub fn store(&self) -> Arc<BeaconStore> {
        self.store.clone()
    }

    /// Run the maintenance engine
    pub async fn start(self) -> Result<Instance, Error> {
        let Engine { store, options } = self;

        let span = span!(Level::DEBUG, "engine", local_ia = %options.local_ia);
        let _enter = span.enter();

        let mut sweep_timer = interval(options.sweep_interval);
        let sweep_timeout = options.sweep_timeout;

        let (exit_tx, mut exit_rx) = mpsc::channel(1);

        let s = store.clone();
        let handle: JoinHandle<Result<(), Error>> = task::spawn(async move {
            loop {
                select! {
                    _tick = sweep_timer.tick().fuse() => {
                        trace!("engine::sweep");

                        match Self::sweep(s.clone(), sweep_timeout).await {
                            Ok((removed, sources)) => {
                                if removed > 0 {
                                    info!("Removed {} expired beacons, {} sources remaining", removed, sources);
                                } else {
                                    debug!("No expired beacons, {} sources", sources);
                                }
                            }
                            Err(Error::Store(e)) if e.is_cancelled() => {
                                warn!("Sweep abandoned: {}", e);
                            }
                            Err(e) => {
                                error!("Sweep failed: {:?}", e);
                            }
                        }
                    },
                    _exit = exit_rx.next().fuse() => {
                        debug!("Exiting sweep handler");
                        return Ok(())
                    }
                }
            }
        });

        Ok(Instance {
            store,
            handle,
            exit_tx,
        })
    }

    /// Remove expired beacons, returning the number removed and the number
    /// of remaining beacon sources
    async fn sweep(store: Arc<BeaconStore>, timeout: Duration) -> Result<(usize, usize), Error> {
        let (removed, sources) = task::spawn_blocking(move || -> Result<_, StoreError> {
            let ctx = Context::new().with_timeout(timeout);

            let removed = store.delete_expired(&ctx, ctx.now())?;
            let sources = store.beacon_sources(&ctx)?;

            Ok((removed, sources.len()))
        })
        .await??;

        Ok((removed, sources))
    }
}

pub struct Instance {
    store: Arc<BeaconStore>,
    handle: JoinHandle<Result<(), Error>>,
    exit_tx: mpsc::Sender<()>,
}

impl Instance {
    /// Shared handle to the beacon store
    pub fn store(&self) -> Arc<BeaconStore> {
        self.store.clone()
    }

    /// Fetch exit tx sender
    pub fn exit_tx(&self) -> mpsc::Sender<()> {
        self.exit_tx.clone()
    }

    /// Await engine exit, closing the store if no other handles remain
    pub async fn join(self) -> Result<(), Error> {
        self.handle.await??;

        match Arc::try_unwrap(self.store) {
            Ok(store) => task::spawn_blocking(move || store.close()).await??,
            Err(_) => warn!("Store still in use, skipping close"),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    use bcn_core::prelude::*;

    use super::*;

    fn beacon(ts: i64, asn: u64) -> Beacon {
        Beacon {
            segment: Segment::new(
                Info {
                    timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
                    seg_id: 1,
                },
                vec![AsEntry {
                    local: IsdAs::new(1, asn),
                    next: IsdAs::new(1, asn + 1),
                    ingress: 0,
                    egress: 1,
                    exp_time: 0,
                    mtu: 1472,
                    signature: vec![],
                }],
            ),
            in_if_id: 3,
        }
    }

    #[test]
    fn engine_options_parse() {
        let o = EngineOptions::try_parse_from([
            "bcnd",
            "--database-file",
            "/tmp/bcn.db",
            "--local-ia",
            "1-ff00:0:110",
            "--sweep-interval",
            "1m",
            "--busy-timeout",
            "2s",
            "--min-idle-conns",
            "2",
        ])
        .unwrap();

        assert_eq!(o.database_file, "/tmp/bcn.db");
        assert_eq!(o.local_ia, IsdAs::new(1, 0xff00_0000_0110));
        assert_eq!(o.sweep_interval, Duration::from_secs(60));
        assert_eq!(o.sweep_timeout, Duration::from_secs(10));
        assert_eq!(o.store_options.busy_timeout, Some(Duration::from_secs(2)));
        assert!(o.store_options.enable_wal);
        assert_eq!(o.store_options.max_open_conns, 8);
        assert_eq!(o.store_options.min_idle_conns, Some(2));

        assert!(EngineOptions::try_parse_from(["bcnd", "--local-ia", "1-ff00"]).is_err());
    }

    #[tokio::test]
    async fn engine_sweeps_expired() {
        let d = TempDir::new().unwrap();

        let options = EngineOptions {
            database_file: d.path().join("db/beacons.db").to_string_lossy().to_string(),
            local_ia: IsdAs::new(1, 0xff00_0000_0110),
            sweep_interval: Duration::from_millis(10),
            ..Default::default()
        };

        let engine = Engine::new(options).await.unwrap();
        let store = engine.store();

        // Expired long ago
        let old = beacon(1_000, 10);
        // Expires well into the future
        let now = Utc::now().timestamp();
        let fresh = beacon(now, 20);

        let ctx = Context::new();
        store.insert_or_update(&ctx, &old, Usage::UP_REG).unwrap();
        store.insert_or_update(&ctx, &fresh, Usage::UP_REG).unwrap();
        drop(store);

        let instance = engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let sources: Vec<_> = instance
            .store()
            .beacon_sources(&ctx)
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(sources, vec![IsdAs::new(1, 20)]);

        instance.exit_tx().send(()).await.unwrap();
        instance.join().await.unwrap();
    }
}
