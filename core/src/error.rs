use thiserror::Error;

/// Core error type, shared by parsers and the segment codec
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("buffer too short")]
    BufferLength,

    #[error("{0} trailing bytes after segment")]
    TrailingBytes(usize),

    #[error("invalid segment: {0}")]
    InvalidSegment(&'static str),

    #[error("segment has no AS entries")]
    NoAsEntries,

    #[error("invalid ISD-AS identifier")]
    InvalidIsdAs,

    #[error("invalid usage flag '{0}'")]
    InvalidUsage(String),

    #[error("timestamp out of range")]
    InvalidTimestamp,
}

impl From<encdec::Error> for Error {
    fn from(_e: encdec::Error) -> Self {
        Self::BufferLength
    }
}
