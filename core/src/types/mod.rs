//! Identifier and flag types used across beacon storage

mod ia;
pub use ia::*;

mod usage;
pub use usage::*;

mod ids;
pub use ids::*;
