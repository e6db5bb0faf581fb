//! Persistent beacon storage
//!
//! [BeaconStore] records beacons received from neighbouring domains in an
//! SQLite database, deduplicating them by segment ID, selecting candidates
//! for propagation, and removing expired entries.
//!
//! All access is arbitrated by a single reader / writer lock wrapping the
//! connection pool. Queries share the lock, while inserts and expiration
//! sweeps hold it exclusively for the whole read-check-write sequence.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError, PooledConnection};
use diesel::sqlite::SqliteConnection;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, instrument, trace, warn};

use bcn_core::prelude::*;

mod beacons;
use beacons::*;

pub mod context;
pub use context::Context;

pub mod error;
pub use error::{BackendError, Op, StoreError};

pub mod schema;
pub use schema::SCHEMA_VERSION;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Candidate beacon or the error encountered decoding it
pub type BeaconOrErr = Result<Beacon, StoreError>;

/// Result of [BeaconDb::insert_or_update], both counters are zero when the
/// beacon was not newer than the stored copy
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct InsertStats {
    pub inserted: usize,
    pub updated: usize,
}

impl InsertStats {
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0
    }
}

/// Beacon storage interface used by the beaconing process
pub trait BeaconDb {
    /// Insert a beacon, or replace the stored copy if this one has a newer info timestamp
    fn insert_or_update(
        &self,
        ctx: &Context,
        beacon: &Beacon,
        usage: Usage,
    ) -> Result<InsertStats, StoreError>;

    /// Fetch up to `max` unexpired beacons matching all of `usage`, shortest paths first,
    /// optionally limited to beacons originating from `src`.
    ///
    /// Rows that fail to decode are returned inline as errors.
    fn candidate_beacons(
        &self,
        ctx: &Context,
        max: usize,
        usage: Usage,
        src: Option<IsdAs>,
    ) -> Result<Vec<BeaconOrErr>, StoreError>;

    /// Fetch the set of domains stored beacons originate from
    fn beacon_sources(&self, ctx: &Context) -> Result<BTreeSet<IsdAs>, StoreError>;

    /// Remove beacons expiring before `now`, returning the number removed
    fn delete_expired(&self, ctx: &Context, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// SQLite3 database connection options
#[derive(Clone, PartialEq, Debug, Parser)]
pub struct StoreOptions {
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    /// Enable write ahead logging
    pub enable_wal: bool,

    #[clap(long, value_parser = humantime::parse_duration, default_value = "500ms")]
    /// Time to wait on a locked database before failing
    pub busy_timeout: Option<Duration>,

    #[clap(long, default_value_t = 8)]
    /// Maximum number of open database connections
    pub max_open_conns: u32,

    #[clap(long)]
    /// Minimum number of idle connections kept open by the pool, defaults to `max_open_conns`.
    ///
    /// This is a floor rather than a cap, idle connections above it are closed after a timeout.
    pub min_idle_conns: Option<u32>,

    #[clap(long, value_parser = humantime::parse_duration, default_value = "30s")]
    /// Time to wait for a free connection
    pub connection_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            enable_wal: true,
            busy_timeout: Some(Duration::from_millis(500)),
            max_open_conns: 8,
            min_idle_conns: None,
            connection_timeout: Duration::from_secs(30),
        }
    }
}

/// Connection customisation for [StoreOptions]
///
/// Enables Write Ahead Logging (WAL) with busy timeouts
///
/// see: <https://stackoverflow.com/questions/57123453/how-to-use-diesel-with-sqlite-connections-and-avoid-database-is-locked-type-of>
impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for StoreOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        (|| {
            if let Some(d) = self.busy_timeout {
                conn.batch_execute(&format!("PRAGMA busy_timeout = {};", d.as_millis()))?;
            }
            if self.enable_wal {
                conn.batch_execute("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
            }
            Ok(())
        })()
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub struct BeaconStore {
    pool: RwLock<DbPool>,
    local_ia: IsdAs,
}

impl BeaconStore {
    /// Create or connect to a store with the provided filename.
    ///
    /// Tables are created for new databases, existing databases must match [SCHEMA_VERSION].
    pub fn new(path: &str, local_ia: IsdAs, opts: StoreOptions) -> Result<Self, StoreError> {
        debug!("Connecting to store: {}", path);

        let in_memory = path.contains(":memory:");

        let mut max_size = opts.max_open_conns.max(1);
        if in_memory && max_size > 1 {
            warn!("In-memory store limited to a single connection");
            max_size = 1;
        }

        // Setup connection manager / pool
        let mut builder = Pool::builder()
            .max_size(max_size)
            .min_idle(opts.min_idle_conns.map(|n| n.min(max_size)))
            .connection_timeout(opts.connection_timeout);

        // In-memory databases only live as long as their connection
        if in_memory {
            builder = builder.idle_timeout(None).max_lifetime(None);
        }

        let pool = builder
            .connection_customizer(Box::new(opts))
            .build(ConnectionManager::new(path))
            .map_err(|e| StoreError::read(Op::Open, e))?;

        // Ensure tables exist and match the expected version
        {
            let mut conn = pool.get().map_err(|e| StoreError::read(Op::Open, e))?;
            schema::init_schema(&mut conn)?;
        }

        Ok(Self {
            pool: RwLock::new(pool),
            local_ia,
        })
    }

    /// Domain this store is operated by
    pub fn local_ia(&self) -> IsdAs {
        self.local_ia
    }

    /// Initialise database tables
    pub fn create_tables(&self) -> Result<(), StoreError> {
        let pool = self.pool.write();
        let mut conn = pool.get().map_err(|e| StoreError::read(Op::Open, e))?;

        schema::create_tables(&mut conn).map_err(|e| StoreError::write(Op::Open, None, e))
    }

    /// Drop database tables, these must be re-created prior to further use
    pub fn drop_tables(&self) -> Result<(), StoreError> {
        let pool = self.pool.write();
        let mut conn = pool.get().map_err(|e| StoreError::read(Op::Open, e))?;

        schema::drop_tables(&mut conn).map_err(|e| StoreError::write(Op::Open, None, e))
    }

    /// Close the store, checkpointing any pending write-ahead log
    pub fn close(self) -> Result<(), StoreError> {
        let pool = self.pool.into_inner();
        let mut conn = pool
            .get()
            .map_err(|e| StoreError::write(Op::Close, None, e))?;

        let c: &mut SqliteConnection = &mut conn;
        c.batch_execute("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(|e| StoreError::write(Op::Close, None, e))?;

        debug!("Closed store");

        Ok(())
    }

    /// Take the lock shared, waiting in slices of at most [LOCK_POLL] so
    /// cancellation is observed while blocked
    fn read_lock(&self, ctx: &Context, op: Op) -> Result<RwLockReadGuard<'_, DbPool>, StoreError> {
        ctx.check(op)?;

        let guard = loop {
            if let Some(g) = self.pool.try_read_for(lock_wait(ctx)) {
                break g;
            }
            ctx.check(op)?;
        };

        ctx.check(op)?;

        Ok(guard)
    }

    /// Take the lock exclusively, see [BeaconStore::read_lock]
    fn write_lock(&self, ctx: &Context, op: Op) -> Result<RwLockWriteGuard<'_, DbPool>, StoreError> {
        ctx.check(op)?;

        let guard = loop {
            if let Some(g) = self.pool.try_write_for(lock_wait(ctx)) {
                break g;
            }
            ctx.check(op)?;
        };

        ctx.check(op)?;

        Ok(guard)
    }
}

/// Interval between context checks while waiting on the store lock
const LOCK_POLL: Duration = Duration::from_millis(10);

fn lock_wait(ctx: &Context) -> Duration {
    match ctx.remaining() {
        Some(t) => t.min(LOCK_POLL),
        None => LOCK_POLL,
    }
}

/// Fetch a connection from the pool, bounded by the context deadline
fn connect(pool: &DbPool, ctx: &Context) -> Result<DbConn, PoolError> {
    match ctx.remaining() {
        Some(t) => pool.get_timeout(t),
        None => pool.get(),
    }
}

impl BeaconDb for BeaconStore {
    #[instrument(skip(self, ctx, beacon))]
    fn insert_or_update(
        &self,
        ctx: &Context,
        beacon: &Beacon,
        usage: Usage,
    ) -> Result<InsertStats, StoreError> {
        let op = Op::InsertOrUpdate;

        // Derive ids and encode outside of the lock
        let record = BeaconRecord::new(beacon, usage, op)?;
        let seg_id = record.seg_id;

        let pool = self.write_lock(ctx, op)?;
        let mut conn = connect(&pool, ctx).map_err(|e| StoreError::read(op, e))?;

        let meta = lookup_meta(&mut conn, &seg_id).map_err(|e| StoreError::read(op, e))?;
        let now = ctx.now();

        match meta {
            Some(meta) if record.info_time > meta.info_time => {
                ctx.check(op)?;

                update_existing(&mut conn, &record, meta.row_id, now)
                    .map_err(|e| StoreError::write(op, Some(seg_id), e))?;

                debug!(%seg_id, "Updated beacon (last updated {})", meta.last_updated);

                Ok(InsertStats {
                    updated: 1,
                    ..Default::default()
                })
            }
            Some(meta) => {
                trace!(%seg_id, "Ignoring beacon, stored info time {} is not older", meta.info_time);

                Ok(InsertStats::default())
            }
            None => {
                ctx.check(op)?;

                insert_new(&mut conn, &record, self.local_ia, now)
                    .map_err(|e| StoreError::write(op, Some(seg_id), e))?;

                debug!(%seg_id, start = %record.start, "Inserted beacon");

                Ok(InsertStats {
                    inserted: 1,
                    ..Default::default()
                })
            }
        }
    }

    #[instrument(skip(self, ctx))]
    fn candidate_beacons(
        &self,
        ctx: &Context,
        max: usize,
        usage: Usage,
        src: Option<IsdAs>,
    ) -> Result<Vec<BeaconOrErr>, StoreError> {
        let op = Op::CandidateBeacons;
        let now = ctx.now();

        // Read rows into memory so the lock is released before decoding
        let rows = {
            let pool = self.read_lock(ctx, op)?;
            let mut conn = connect(&pool, ctx).map_err(|e| StoreError::read(op, e))?;

            select_candidates(&mut conn, max, usage, src, now)
                .map_err(|e| StoreError::read(op, e))?
        };

        trace!("Loaded {} candidate rows", rows.len());

        Ok(rows.into_iter().map(|r| r.decode(op)).collect())
    }

    #[instrument(skip(self, ctx))]
    fn beacon_sources(&self, ctx: &Context) -> Result<BTreeSet<IsdAs>, StoreError> {
        let op = Op::BeaconSources;

        let pool = self.read_lock(ctx, op)?;
        let mut conn = connect(&pool, ctx).map_err(|e| StoreError::read(op, e))?;

        select_sources(&mut conn).map_err(|e| StoreError::read(op, e))
    }

    #[instrument(skip(self, ctx))]
    fn delete_expired(&self, ctx: &Context, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let op = Op::DeleteExpired;

        let pool = self.write_lock(ctx, op)?;
        let mut conn = connect(&pool, ctx).map_err(|e| StoreError::write(op, None, e))?;

        ctx.check(op)?;

        let n = delete_where_expired(&mut conn, now)
            .map_err(|e| StoreError::write(op, None, e))?;

        if n > 0 {
            debug!("Removed {} expired beacons", n);
        }

        Ok(n)
    }
}
