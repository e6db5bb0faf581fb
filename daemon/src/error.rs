pub use bcn_core::error::Error as CoreError;

use thiserror::Error;

pub use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("datastore error")]
    Store(#[source] StoreError),
    #[error("beacon core error")]
    Core(#[source] CoreError),
    #[error("task join error")]
    Join(#[source] tokio::task::JoinError),
    #[error("io error")]
    Io(#[source] std::io::Error),

    #[error("closed")]
    Closed,
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<CoreError> for Error {
    fn from(e: CoreError) -> Self {
        Self::Core(e)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Join(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
