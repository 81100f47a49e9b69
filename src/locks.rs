//! Per-bucket reader/writer locks, striped over the bucket id space.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use xxhash_rust::xxh3::xxh3_64;

/// Derives the bucket a key belongs to.
pub fn bucket_id_for_key(key: &str, bucket_count: u64) -> u64 {
    xxh3_64(key.as_bytes()) % bucket_count.max(1)
}

/// Striped lock registry guarding mutations of individual buckets.
///
/// Guards are RAII: dropping releases, so an unlock can never be
/// unbalanced. Distinct bucket ids may share a stripe; that only widens
/// the critical section, never narrows it.
#[derive(Debug)]
pub struct BucketLocks {
    stripes: Box<[RwLock<()>]>,
}

impl BucketLocks {
    pub fn new(stripes: usize) -> Self {
        let stripes = stripes.max(1);
        Self {
            stripes: (0..stripes).map(|_| RwLock::new(())).collect(),
        }
    }

    fn stripe(&self, bucket_id: u64) -> &RwLock<()> {
        let index = (bucket_id % self.stripes.len() as u64) as usize;
        &self.stripes[index]
    }

    pub fn read(&self, bucket_id: u64) -> RwLockReadGuard<'_, ()> {
        self.stripe(bucket_id).read()
    }

    pub fn write(&self, bucket_id: u64) -> RwLockWriteGuard<'_, ()> {
        self.stripe(bucket_id).write()
    }
}
