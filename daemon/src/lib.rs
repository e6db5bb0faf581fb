//! Beacon store daemon
//!
//! Persistent storage for path-segment beacons, along with a maintenance
//! engine that periodically removes expired entries.

pub mod error;

pub mod store;

pub mod engine;

pub mod prelude {
    pub use crate::engine::{Engine, EngineOptions, Instance};
    pub use crate::error::Error;
    pub use crate::store::{
        BeaconDb, BeaconOrErr, BeaconStore, Context, InsertStats, Op, StoreError, StoreOptions,
    };
}
