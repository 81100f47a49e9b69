//! The bucketed, file-system-backed cache store.
//!
//! One file per bucket under `{location}/{cache_name}`, named by the
//! bucket's decimal id. Durability is delegated to the configured
//! [`FileSync`] backend; serialization to the injected [`Marshaller`].

mod stream;

use crate::bucket::codec::Marshaller;
use crate::bucket::{now_ms, Bucket};
use crate::cancel::CancelToken;
use crate::config::{resolve_root, FsyncMode, StoreConfig};
use crate::error::{ConfigError, LoaderError};
use crate::locks::{bucket_id_for_key, BucketLocks};
use crate::purge::PurgeExecutor;
use crate::sync::FileSync;
use log::{debug, warn};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Handler verdict for [`BucketStore::loop_over_buckets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketScan {
    Continue,
    Stop,
}

/// Cheaply cloneable handle to one cache's bucket files.
///
/// All clones share the root, the durability backend and the per-bucket
/// locks; the backend is stopped when the last handle drops or on an
/// explicit [`BucketStore::stop`].
#[derive(Clone)]
pub struct BucketStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: StoreConfig,
    root: PathBuf,
    marshaller: Arc<dyn Marshaller>,
    file_sync: FileSync,
    locks: BucketLocks,
    cancel: CancelToken,
    purge_executor: Mutex<Option<Arc<dyn PurgeExecutor>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.file_sync.stop();
    }
}

impl BucketStore {
    /// Resolves and creates the root directory, then selects the
    /// durability backend from the configured fsync mode.
    pub fn open(
        config: StoreConfig,
        cache_name: &str,
        marshaller: Arc<dyn Marshaller>,
    ) -> Result<Self, ConfigError> {
        if config.stream_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "stream_buffer_size must be non-zero".into(),
            ));
        }
        if config.bucket_count == 0 {
            return Err(ConfigError::Invalid("bucket_count must be non-zero".into()));
        }

        let root = resolve_root(&config.location, cache_name);
        fs::create_dir_all(&root).map_err(|source| ConfigError::RootUnavailable {
            path: root.clone(),
            source,
        })?;
        if !root.is_dir() {
            return Err(ConfigError::RootNotADirectory { path: root });
        }

        let file_sync = match config.fsync_mode {
            FsyncMode::Default => FileSync::buffered(),
            FsyncMode::PerWrite => FileSync::per_write(),
            FsyncMode::Periodic => {
                FileSync::periodic(Duration::from_millis(config.fsync_interval_ms))
            }
        };
        let locks = BucketLocks::new(config.bucket_count.min(1024) as usize);

        Ok(Self {
            inner: Arc::new(StoreInner {
                root,
                marshaller,
                file_sync,
                locks,
                cancel: CancelToken::new(),
                purge_executor: Mutex::new(None),
                config,
            }),
        })
    }

    /// Root directory all bucket files for this cache are written under.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }

    pub fn supports_multi_threaded_purge(&self) -> bool {
        true
    }

    /// Installs the executor purge sweeps fan out on when
    /// `multi_threaded_purge` is configured.
    pub fn set_purge_executor(&self, executor: Arc<dyn PurgeExecutor>) {
        *self.inner.purge_executor.lock() = Some(executor);
    }

    /// Quiesces the durability backend: forces cached writes, closes
    /// channels and stops background work. Idempotent.
    pub fn stop(&self) {
        self.inner.file_sync.stop();
    }

    fn bucket_path(&self, id: u64) -> PathBuf {
        self.inner.root.join(id.to_string())
    }

    /// Persists the bucket's current entry set, replacing any previous
    /// image. An empty bucket leaves no content behind: the existing file
    /// is purged and nothing is written.
    pub fn update_bucket(&self, bucket: &Bucket) -> Result<(), LoaderError> {
        if self.inner.cancel.is_cancelled() {
            debug!("cancelled, aborting update of bucket {}", bucket.id());
            return Ok(());
        }
        let path = self.bucket_path(bucket.id());
        if path.exists() {
            if let Err(err) = self.inner.file_sync.purge(&path) {
                warn!("problems clearing bucket file {}: {err}", path.display());
            }
        }
        if !bucket.is_empty() {
            let bytes = self.inner.marshaller.to_bytes(bucket)?;
            self.inner.file_sync.write(&bytes, &path)?;
        }
        Ok(())
    }

    /// Loads the bucket with the given id, or `None` when no image exists
    /// or the store was cancelled.
    pub fn load_bucket(&self, id: u64) -> Result<Option<Bucket>, LoaderError> {
        self.load_bucket_file(&self.bucket_path(id))
    }

    /// Routes the key through the configured bucket count and loads the
    /// bucket its hash lands in.
    pub fn load_bucket_containing_key(&self, key: &str) -> Result<Option<Bucket>, LoaderError> {
        self.load_bucket(bucket_id_for_key(key, self.inner.config.bucket_count))
    }

    fn load_bucket_file(&self, path: &Path) -> Result<Option<Bucket>, LoaderError> {
        if self.inner.cancel.is_cancelled() {
            debug!("cancelled, returning no bucket for {}", path.display());
            return Ok(None);
        }
        if !path.exists() {
            return Ok(None);
        }
        // The channel may hold bytes not yet forced; flush before reading.
        self.inner.file_sync.flush(path)?;
        let metadata = fs::metadata(path)?;
        if metadata.len() == 0 {
            // Transient state left by a purge-clear: no bucket.
            return Ok(None);
        }
        let mut file = fs::File::open(path)?;
        // The length is a sizing hint only; always read to EOF.
        let mut bytes = Vec::with_capacity(metadata.len() as usize);
        file.read_to_end(&mut bytes)?;
        let mut bucket = self.inner.marshaller.from_bytes(&bytes)?;
        if let Some(id) = file_bucket_id(path) {
            bucket.stamp_id(id);
        }
        Ok(Some(bucket))
    }

    /// Deletes every file under the root. A missing root is a no-op;
    /// per-file failures are logged and the sweep continues.
    pub fn clear(&self) -> Result<(), LoaderError> {
        let entries = match fs::read_dir(&self.inner.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(err) => {
                    warn!("problems listing cache root: {err}");
                    continue;
                }
            };
            if let Err(err) = fs::remove_file(&path) {
                warn!("problems removing file {}: {err}", path.display());
            }
        }
        Ok(())
    }

    /// Feeds every materialized bucket to `handler` until it returns
    /// [`BucketScan::Stop`]. Cancellation halts the loop without error;
    /// absent and zero-length files are skipped.
    pub fn loop_over_buckets(
        &self,
        mut handler: impl FnMut(Bucket) -> BucketScan,
    ) -> Result<(), LoaderError> {
        let files = match self.bucket_files() {
            Ok(files) => files,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        for path in files {
            if self.inner.cancel.is_cancelled() {
                debug!("cancelled, stopping bucket enumeration");
                return Ok(());
            }
            if let Some(bucket) = self.load_bucket_file(&path)? {
                if handler(bucket) == BucketScan::Stop {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Rewrites every bucket whose entries expired, inline or fanned out
    /// on the configured executor. Files whose names do not parse as
    /// bucket ids are skipped with a warning; per-file failures are
    /// logged and the sweep continues.
    pub fn purge_expired(&self) -> Result<(), LoaderError> {
        let files = self.bucket_files().map_err(|_| LoaderError::NotADirectory {
            path: self.inner.root.clone(),
        })?;
        let executor = self
            .inner
            .purge_executor
            .lock()
            .clone()
            .filter(|_| self.inner.config.multi_threaded_purge);
        for path in files {
            if self.inner.cancel.is_cancelled() {
                debug!("cancelled, stopping the purge sweep");
                return Ok(());
            }
            let Some(id) = file_bucket_id(&path) else {
                warn!(
                    "skipping purge of {}: file name is not a bucket id",
                    path.display()
                );
                continue;
            };
            match &executor {
                Some(pool) => {
                    let store = self.clone();
                    pool.execute(Box::new(move || {
                        if let Err(err) = store.purge_bucket_file(&path, id) {
                            warn!("problems purging file {}: {err}", path.display());
                        }
                    }));
                }
                None => {
                    if let Err(err) = self.purge_bucket_file(&path, id) {
                        warn!("problems purging file {}: {err}", path.display());
                    }
                }
            }
        }
        Ok(())
    }

    fn purge_bucket_file(&self, path: &Path, id: u64) -> Result<(), LoaderError> {
        if self.inner.cancel.is_cancelled() {
            debug!("cancelled, finishing purge of {}", path.display());
            return Ok(());
        }
        let Some(mut bucket) = self.load_bucket_file(path)? else {
            return Ok(());
        };
        if !bucket.remove_expired_entries(now_ms()) {
            return Ok(());
        }
        // Rewrite only under this bucket's write lock.
        let _guard = self.lock_bucket_for_writing(id);
        self.update_bucket(&bucket)
    }

    /// Write-locks the bucket for the caller's own critical section.
    pub fn lock_bucket_for_writing(&self, id: u64) -> parking_lot::RwLockWriteGuard<'_, ()> {
        self.inner.locks.write(id)
    }

    fn bucket_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.inner.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Bucket id encoded in the file name, if it follows the decimal
/// convention.
fn file_bucket_id(path: &Path) -> Option<u64> {
    path.file_name()?.to_str()?.parse().ok()
}
