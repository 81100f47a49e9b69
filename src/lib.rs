//! Bucketed, file-system-backed cache store.
//!
//! Persistent backing tier for an in-memory cache: opaque keys hash into
//! buckets, each bucket persists as one file under a per-cache directory,
//! and durability is pluggable across per-write, buffered and periodic
//! fsync disciplines. Bulk stream export/import copies the live file
//! layout between nodes without re-marshalling.
#![deny(unreachable_pub)]
#![deny(unused_must_use)]

pub mod bucket;
pub mod cancel;
pub mod config;
pub mod error;
pub mod locks;
pub mod purge;
pub mod store;
pub mod sync;

pub use bucket::codec::{JsonMarshaller, MarshalError, Marshaller};
pub use bucket::{now_ms, Bucket, BucketEntry};
pub use cancel::CancelToken;
pub use config::{resolve_root, FsyncMode, StoreConfig, DEFAULT_LOCATION};
pub use error::{ConfigError, LoaderError};
pub use locks::{bucket_id_for_key, BucketLocks};
pub use purge::{PurgeExecutor, PurgeTask, PurgeThreadPool};
pub use store::{BucketScan, BucketStore};
pub use sync::{BufferedSync, FileSync, PerWriteSync, PeriodicSync};
