use crate::bucket::codec::MarshalError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Raised from [`crate::store::BucketStore::open`] only.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cache directory {path:?} does not exist and cannot be created: {source}")]
    RootUnavailable { path: PathBuf, source: io::Error },
    #[error("cache directory {path:?} is not a directory")]
    RootNotADirectory { path: PathBuf },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Any I/O or marshalling failure in read, write, list or stream transfer.
///
/// Cancellation is never reported through this type; cancelled operations
/// return empty or early results instead.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("cache store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Marshal(#[from] MarshalError),
    #[error("root {path:?} is not a directory or cannot be listed")]
    NotADirectory { path: PathBuf },
    #[error("stream catalog entry {name:?} exceeds the transferable size")]
    EntryTooLarge { name: String },
    #[error("stream catalog entry name {name:?} is not a plain file name")]
    InvalidEntryName { name: String },
}
