use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel::sqlite::SqliteConnection;
use diesel::*;

use super::{Op, StoreError};

/// Version of the beacon table layout, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: i32 = 2;

// `info_time` is in unix seconds, `expiration_time` and `last_updated` in unix nanoseconds
table! {
    beacons (row_id) {
        row_id -> BigInt,
        seg_id -> Binary,
        full_id -> Binary,

        start_isd -> Integer,
        start_as -> BigInt,
        in_if_id -> Integer,
        hops_length -> Integer,

        info_time -> BigInt,
        expiration_time -> BigInt,
        last_updated -> BigInt,

        usage -> Integer,
        beacon -> Binary,
    }
}

#[derive(QueryableByName)]
struct UserVersion {
    #[diesel(sql_type = Integer)]
    user_version: i32,
}

/// Read the schema version of an opened database, zero for new databases
pub(super) fn schema_version(conn: &mut SqliteConnection) -> Result<i32, StoreError> {
    let v = sql_query("PRAGMA user_version;")
        .get_result::<UserVersion>(conn)
        .map_err(|e| StoreError::read(Op::Open, e))?;

    Ok(v.user_version)
}

/// Check the schema version and create tables for new databases
///
/// This is called automatically when opening a store
pub(super) fn init_schema(conn: &mut SqliteConnection) -> Result<(), StoreError> {
    match schema_version(conn)? {
        0 => (),
        SCHEMA_VERSION => return Ok(()),
        found => {
            return Err(StoreError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found,
            })
        }
    }

    conn.transaction(|conn| {
        create_tables(conn)?;
        conn.batch_execute(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))
    })
    .map_err(|e| StoreError::write(Op::Open, None, e))
}

/// Initialise database tables
pub(super) fn create_tables(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    sql_query(
        "CREATE TABLE IF NOT EXISTS beacons (
        row_id INTEGER PRIMARY KEY,
        seg_id BLOB NOT NULL UNIQUE,
        full_id BLOB NOT NULL,

        start_isd INTEGER NOT NULL,
        start_as INTEGER NOT NULL,
        in_if_id INTEGER NOT NULL,
        hops_length INTEGER NOT NULL,

        info_time INTEGER NOT NULL,
        expiration_time INTEGER NOT NULL,
        last_updated INTEGER NOT NULL,

        usage INTEGER NOT NULL,
        beacon BLOB NOT NULL
    );",
    )
    .execute(conn)?;

    sql_query("CREATE INDEX IF NOT EXISTS beacons_src_idx ON beacons(start_isd, start_as);")
        .execute(conn)?;
    sql_query("CREATE INDEX IF NOT EXISTS beacons_exp_idx ON beacons(expiration_time);")
        .execute(conn)?;
    sql_query("CREATE INDEX IF NOT EXISTS beacons_usage_idx ON beacons(usage, hops_length);")
        .execute(conn)?;

    Ok(())
}

/// Drop database tables
pub(super) fn drop_tables(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    sql_query("DROP TABLE IF EXISTS beacons;").execute(conn)?;

    conn.batch_execute("PRAGMA user_version = 0;")?;

    Ok(())
}
