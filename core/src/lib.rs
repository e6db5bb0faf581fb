//! Beacon core definitions
//!
//! Provides the domain identifiers, usage flags and path segment model used by
//! the beacon store, along with the byte-level encoding of segments.

pub mod error;
pub use error::Error;

pub mod types;

pub mod segment;

pub mod prelude {
    pub use crate::error::Error as CoreError;
    pub use crate::segment::{pack_beacon, unpack_beacon, AsEntry, Beacon, Info, Segment};
    pub use crate::types::*;
}
