use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Relative directory used when no location is configured.
pub const DEFAULT_LOCATION: &str = "buckstore-data";

/// How writes reach stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FsyncMode {
    /// Buffered channels; durability deferred to explicit flushes and stop.
    #[default]
    Default,
    /// Open, write and close per call; no cached handles.
    PerWrite,
    /// Buffered channels forced by a background flusher at a fixed interval.
    Periodic,
}

/// Knobs consumed by [`crate::store::BucketStore::open`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base directory for all caches; empty or whitespace selects
    /// [`DEFAULT_LOCATION`] relative to the working directory.
    pub location: String,
    /// Chunk size for bulk stream transfer and file copies, in bytes.
    pub stream_buffer_size: usize,
    pub fsync_mode: FsyncMode,
    /// Flush cadence of the background flusher; only read in
    /// [`FsyncMode::Periodic`].
    pub fsync_interval_ms: u64,
    /// Fan expired-entry purges out on the configured executor.
    pub multi_threaded_purge: bool,
    /// Number of buckets keys are hashed into; also sizes the lock stripes.
    pub bucket_count: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: String::new(),
            stream_buffer_size: 8192,
            fsync_mode: FsyncMode::Default,
            fsync_interval_ms: 1000,
            multi_threaded_purge: false,
            bucket_count: 256,
        }
    }
}

/// Resolves the root directory for one named cache.
///
/// An empty or whitespace location falls back to the relative default, so
/// two caches with distinct names never share a root.
pub fn resolve_root(location: &str, cache_name: &str) -> PathBuf {
    let base = if location.trim().is_empty() {
        Path::new(DEFAULT_LOCATION)
    } else {
        Path::new(location)
    };
    base.join(cache_name)
}
