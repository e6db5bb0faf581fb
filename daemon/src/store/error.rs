use diesel::r2d2::PoolError;
use diesel::result::Error as DieselError;
use diesel::ConnectionError;
use strum::Display;
use thiserror::Error;

use bcn_core::{types::SegmentId, Error as CoreError};

/// Store operations, attached to errors for context
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum Op {
    #[strum(serialize = "open")]
    Open,
    #[strum(serialize = "insert_or_update")]
    InsertOrUpdate,
    #[strum(serialize = "candidate_beacons")]
    CandidateBeacons,
    #[strum(serialize = "beacon_sources")]
    BeaconSources,
    #[strum(serialize = "delete_expired")]
    DeleteExpired,
    #[strum(serialize = "close")]
    Close,
}

/// Failures raised by the underlying database
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Diesel(#[from] DieselError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Beacon contents could not be decoded, for stored rows this is reported per-row
    #[error("{op}: invalid beacon data (segment: {seg_id:?})")]
    Data {
        op: Op,
        seg_id: Option<SegmentId>,
        #[source]
        source: CoreError,
    },

    /// Beacon could not be encoded for storage, raised prior to any database access
    #[error("{op}: invalid input beacon {seg_id}")]
    InputData {
        op: Op,
        seg_id: SegmentId,
        #[source]
        source: CoreError,
    },

    #[error("{op}: database read failed")]
    Read {
        op: Op,
        #[source]
        source: BackendError,
    },

    /// Write failed, no partial changes have been applied
    #[error("{op}: database write failed (segment: {seg_id:?})")]
    Write {
        op: Op,
        seg_id: Option<SegmentId>,
        #[source]
        source: BackendError,
    },

    #[error("schema version mismatch (expected {expected}, found {found})")]
    SchemaVersion { expected: i32, found: i32 },

    #[error("{op}: cancelled")]
    Cancelled { op: Op },

    #[error("{op}: deadline exceeded")]
    DeadlineExceeded { op: Op },
}

impl StoreError {
    pub(crate) fn read(op: Op, e: impl Into<BackendError>) -> Self {
        Self::Read {
            op,
            source: e.into(),
        }
    }

    pub(crate) fn write(op: Op, seg_id: Option<SegmentId>, e: impl Into<BackendError>) -> Self {
        Self::Write {
            op,
            seg_id,
            source: e.into(),
        }
    }

    /// Operation the error was raised by, where applicable
    pub fn op(&self) -> Option<Op> {
        match self {
            Self::Data { op, .. }
            | Self::InputData { op, .. }
            | Self::Read { op, .. }
            | Self::Write { op, .. }
            | Self::Cancelled { op }
            | Self::DeadlineExceeded { op } => Some(*op),
            Self::SchemaVersion { .. } => None,
        }
    }

    /// Check whether the operation was abandoned due to cancellation or deadline expiry
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }
}
