//! Durability strategies over a uniform write/flush/purge/stop contract.
//!
//! The store trades write latency against durability and amortised fsync
//! cost: [`PerWriteSync`] hands every image to the OS immediately,
//! [`BufferedSync`] keeps one open channel per file and defers forcing to
//! explicit flushes and stop, and [`PeriodicSync`] adds a background
//! flusher that forces every channel at a fixed interval.

mod buffered;
mod per_write;
mod periodic;

pub use buffered::BufferedSync;
pub use per_write::PerWriteSync;
pub use periodic::PeriodicSync;

use std::io;
use std::path::Path;
use std::time::Duration;

/// The selected durability strategy.
///
/// Callers of [`FileSync::write`] hold the per-bucket write lock; writes
/// to distinct files are unordered with respect to each other.
#[derive(Debug)]
pub enum FileSync {
    PerWrite(PerWriteSync),
    Buffered(BufferedSync),
    Periodic(PeriodicSync),
}

impl FileSync {
    pub fn per_write() -> Self {
        FileSync::PerWrite(PerWriteSync)
    }

    pub fn buffered() -> Self {
        FileSync::Buffered(BufferedSync::new())
    }

    pub fn periodic(interval: Duration) -> Self {
        FileSync::Periodic(PeriodicSync::new(interval))
    }

    /// Persists `bytes` as the new full content of `path`. An empty
    /// payload removes the file if present.
    pub fn write(&self, bytes: &[u8], path: &Path) -> io::Result<()> {
        match self {
            FileSync::PerWrite(sync) => sync.write(bytes, path),
            FileSync::Buffered(sync) => sync.write(bytes, path),
            FileSync::Periodic(sync) => sync.write(bytes, path),
        }
    }

    /// Forces previously written bytes for `path` to stable storage.
    /// Callers have verified the file exists.
    pub fn flush(&self, path: &Path) -> io::Result<()> {
        match self {
            FileSync::PerWrite(sync) => sync.flush(path),
            FileSync::Buffered(sync) => sync.flush(path),
            FileSync::Periodic(sync) => sync.flush(path),
        }
    }

    /// Clears the file: deletion under [`PerWriteSync`], a zero-length
    /// truncate under the channel-caching strategies.
    pub fn purge(&self, path: &Path) -> io::Result<()> {
        match self {
            FileSync::PerWrite(sync) => sync.purge(path),
            FileSync::Buffered(sync) => sync.purge(path),
            FileSync::Periodic(sync) => sync.purge(path),
        }
    }

    /// Quiesces the strategy: forces cached writes, releases handles and
    /// stops background work. Safe to call more than once.
    pub fn stop(&self) {
        match self {
            FileSync::PerWrite(sync) => sync.stop(),
            FileSync::Buffered(sync) => sync.stop(),
            FileSync::Periodic(sync) => sync.stop(),
        }
    }
}
