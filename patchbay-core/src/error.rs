//! Error types.

use std::io;

use crate::endpoint::EndpointRef;

pub type Result<T> = core::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

/// Crate-wide error type.
///
/// Transient transfer conditions (empty source, full destination, missing
/// attachment) are not errors, they are the normal "try again next tick"
/// outcome and never show up here.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(String),

    #[error("toml deserialization error: {0}")]
    TomlDeserError(#[from] toml::de::Error),

    #[error("parsing error: {0}")]
    ParsingError(String),

    #[error("no endpoint at: {0}")]
    NoEndpoint(EndpointRef),
    #[error("endpoint already placed at: {0}")]
    EndpointOccupied(EndpointRef),

    #[cfg(feature = "lz4")]
    #[error("failed decompressing snapshot: {0}")]
    SnapshotDecompressionError(String),
    #[error("failed reading snapshot: {0}")]
    FailedReadingSnapshot(String),
    #[error("failed creating snapshot: {0}")]
    FailedCreatingSnapshot(String),

    #[error("other error: {0}")]
    Other(String),
}
