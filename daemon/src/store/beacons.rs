//! Beacon record access
//!
//! Translates between [Beacon] objects and rows of the `beacons` table.
//! These functions issue statements directly and must only be called while
//! holding the store lock.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use diesel::prelude::*;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_query;
use diesel::sql_types::{BigInt, Binary, Integer};
use diesel::sqlite::{Sqlite, SqliteConnection};
use tracing::trace;

use bcn_core::prelude::*;

use super::{Op, StoreError};

/// Scalar fields and encoded payload for a beacon.
///
/// These are derived from the segment alone, so can be computed before the
/// store lock is taken.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BeaconRecord {
    pub seg_id: SegmentId,
    pub full_id: FullId,
    pub start: IsdAs,
    pub in_if_id: u16,
    pub hops: usize,
    /// Unix seconds
    pub info_time: i64,
    /// Unix nanoseconds
    pub expiration_time: i64,
    pub usage: Usage,
    pub packed: Vec<u8>,
}

impl BeaconRecord {
    pub fn new(beacon: &Beacon, usage: Usage, op: Op) -> Result<Self, StoreError> {
        let segment = &beacon.segment;
        let seg_id = segment.id();

        let data_err = move |source| StoreError::Data {
            op,
            seg_id: Some(seg_id),
            source,
        };

        let start = segment.first_ia().ok_or(CoreError::NoAsEntries).map_err(data_err)?;
        let expiration_time = segment
            .max_expiry()
            .and_then(|t| t.timestamp_nanos_opt().ok_or(CoreError::InvalidTimestamp))
            .map_err(data_err)?;

        let packed = pack_beacon(segment).map_err(|source| StoreError::InputData {
            op,
            seg_id,
            source,
        })?;

        Ok(Self {
            seg_id,
            full_id: segment.full_id(),
            start,
            in_if_id: beacon.in_if_id,
            hops: segment.hop_count(),
            info_time: segment.info.timestamp.timestamp(),
            expiration_time,
            usage,
            packed,
        })
    }
}

/// Bookkeeping for a stored beacon, used to decide whether to replace it
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BeaconMeta {
    pub row_id: i64,
    /// Unix seconds
    pub info_time: i64,
    pub last_updated: DateTime<Utc>,
}

/// Candidate row, decoded after the store lock is released
#[derive(Debug, QueryableByName)]
pub(crate) struct CandidateRow {
    #[diesel(sql_type = Binary)]
    pub seg_id: Vec<u8>,
    #[diesel(sql_type = Integer)]
    pub in_if_id: i32,
    #[diesel(sql_type = Binary)]
    pub beacon: Vec<u8>,
}

impl CandidateRow {
    pub fn decode(self, op: Op) -> Result<Beacon, StoreError> {
        let seg_id = SegmentId::try_from(self.seg_id.as_slice()).ok();

        let data_err = move |source| StoreError::Data { op, seg_id, source };

        let segment = unpack_beacon(&self.beacon).map_err(data_err)?;
        let in_if_id = u16::try_from(self.in_if_id)
            .map_err(|_| data_err(CoreError::InvalidSegment("interface out of range")))?;

        Ok(Beacon { segment, in_if_id })
    }
}

/// Unix nanoseconds, saturating outside the range of `i64`
fn to_nanos(t: DateTime<Utc>) -> i64 {
    match t.timestamp_nanos_opt() {
        Some(n) => n,
        None if t.timestamp() < 0 => i64::MIN,
        None => i64::MAX,
    }
}

/// Fetch metadata for an existing beacon
pub(crate) fn lookup_meta(
    conn: &mut SqliteConnection,
    id: &SegmentId,
) -> QueryResult<Option<BeaconMeta>> {
    use super::schema::beacons::dsl::*;

    let r = beacons
        .filter(seg_id.eq(id.as_ref()))
        .select((row_id, info_time, last_updated))
        .first::<(i64, i64, i64)>(conn)
        .optional()?;

    Ok(r.map(|(r, i, l)| BeaconMeta {
        row_id: r,
        info_time: i,
        last_updated: Utc.timestamp_nanos(l),
    }))
}

/// Insert a new beacon within a transaction
pub(crate) fn insert_new(
    conn: &mut SqliteConnection,
    rec: &BeaconRecord,
    local_ia: IsdAs,
    now: DateTime<Utc>,
) -> QueryResult<()> {
    use super::schema::beacons::dsl::*;

    trace!(seg_id = %rec.seg_id, start = %rec.start, local = %local_ia, "insert beacon");

    let values = (
        seg_id.eq(rec.seg_id.as_ref()),
        full_id.eq(rec.full_id.as_ref()),
        start_isd.eq(rec.start.isd as i32),
        start_as.eq(rec.start.asn as i64),
        in_if_id.eq(rec.in_if_id as i32),
        hops_length.eq(rec.hops as i32),
        info_time.eq(rec.info_time),
        expiration_time.eq(rec.expiration_time),
        last_updated.eq(to_nanos(now)),
        usage.eq(rec.usage.bits() as i32),
        beacon.eq(rec.packed.as_slice()),
    );

    conn.transaction(|conn| {
        diesel::insert_into(beacons).values(values).execute(conn)?;
        Ok(())
    })
}

/// Replace the mutable fields of an existing beacon
pub(crate) fn update_existing(
    conn: &mut SqliteConnection,
    rec: &BeaconRecord,
    id: i64,
    now: DateTime<Utc>,
) -> QueryResult<()> {
    use super::schema::beacons::dsl::*;

    trace!(seg_id = %rec.seg_id, row = id, "update beacon");

    diesel::update(beacons.filter(row_id.eq(id)))
        .set((
            full_id.eq(rec.full_id.as_ref()),
            in_if_id.eq(rec.in_if_id as i32),
            hops_length.eq(rec.hops as i32),
            info_time.eq(rec.info_time),
            expiration_time.eq(rec.expiration_time),
            last_updated.eq(to_nanos(now)),
            usage.eq(rec.usage.bits() as i32),
            beacon.eq(rec.packed.as_slice()),
        ))
        .execute(conn)?;

    Ok(())
}

/// Remove beacons expiring before `threshold` within a transaction,
/// returning the number of rows removed
pub(crate) fn delete_where_expired(
    conn: &mut SqliteConnection,
    threshold: DateTime<Utc>,
) -> QueryResult<usize> {
    use super::schema::beacons::dsl::*;

    let t = to_nanos(threshold);

    conn.transaction(|conn| {
        diesel::delete(beacons.filter(expiration_time.lt(t))).execute(conn)
    })
}

/// Select unexpired beacons matching all bits of `mask`, shortest first
pub(crate) fn select_candidates(
    conn: &mut SqliteConnection,
    max: usize,
    mask: Usage,
    src: Option<IsdAs>,
    now: DateTime<Utc>,
) -> QueryResult<Vec<CandidateRow>> {
    let src = src.filter(|ia| !ia.is_zero());
    let src_cond = match src {
        Some(_) => "AND start_isd = ? AND start_as = ?",
        None => "",
    };

    let query = format!(
        "SELECT seg_id, in_if_id, beacon FROM beacons
        WHERE (usage & ?) = ? AND expiration_time >= ? {src_cond}
        ORDER BY hops_length ASC, row_id ASC
        LIMIT ?;"
    );

    let mask = mask.bits() as i32;
    let limit = i64::try_from(max).unwrap_or(i64::MAX);

    let q: BoxedSqlQuery<'_, Sqlite, SqlQuery> = sql_query(query).into_boxed();
    let q = q
        .bind::<Integer, _>(mask)
        .bind::<Integer, _>(mask)
        .bind::<BigInt, _>(to_nanos(now));

    let q = match src {
        Some(ia) => q
            .bind::<Integer, _>(ia.isd as i32)
            .bind::<BigInt, _>(ia.asn as i64),
        None => q,
    };

    q.bind::<BigInt, _>(limit).load::<CandidateRow>(conn)
}

/// Fetch the distinct set of domains stored beacons originate from
pub(crate) fn select_sources(conn: &mut SqliteConnection) -> QueryResult<BTreeSet<IsdAs>> {
    use super::schema::beacons::dsl::*;

    let r = beacons
        .select((start_isd, start_as))
        .distinct()
        .load::<(i32, i64)>(conn)?;

    Ok(r
        .into_iter()
        .map(|(i, a)| IsdAs::new(i as Isd, a as Asn))
        .collect())
}
