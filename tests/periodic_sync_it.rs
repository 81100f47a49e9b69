use buckstore::{Bucket, BucketEntry, BucketStore, FsyncMode, JsonMarshaller, StoreConfig};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn open_periodic(dir: &TempDir, interval_ms: u64) -> BucketStore {
    let config = StoreConfig {
        location: dir.path().display().to_string(),
        fsync_mode: FsyncMode::Periodic,
        fsync_interval_ms: interval_ms,
        ..StoreConfig::default()
    };
    BucketStore::open(config, "c", Arc::new(JsonMarshaller)).expect("open store")
}

#[test]
fn periodic_store_round_trips_buckets() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_periodic(&dir, 50);

    let mut bucket = Bucket::new(7);
    bucket.insert("a", BucketEntry::new(b"x".to_vec()));
    store.update_bucket(&bucket).unwrap();

    let loaded = store.load_bucket(7).unwrap().expect("bucket present");
    assert_eq!(loaded.entries(), bucket.entries());
    store.stop();
}

#[test]
fn background_ticks_keep_the_store_healthy() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_periodic(&dir, 20);

    for id in 0..4u64 {
        let mut bucket = Bucket::new(id);
        bucket.insert(format!("k{id}"), BucketEntry::new(vec![id as u8; 32]));
        store.update_bucket(&bucket).unwrap();
    }
    // Let several flush intervals elapse while the store keeps serving.
    thread::sleep(Duration::from_millis(120));

    for id in 0..4u64 {
        assert!(store.load_bucket(id).unwrap().is_some(), "bucket {id}");
    }
    store.stop();
}

#[test]
fn stop_persists_pending_writes_for_a_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_periodic(&dir, 60_000);

    let mut bucket = Bucket::new(2);
    bucket.insert("k", BucketEntry::new(b"pending".to_vec()));
    store.update_bucket(&bucket).unwrap();
    // The interval is far away; stop must force the write itself.
    store.stop();
    drop(store);

    let reopened = open_periodic(&dir, 60_000);
    let loaded = reopened.load_bucket(2).unwrap().expect("bucket present");
    assert_eq!(loaded.get("k"), Some(&BucketEntry::new(b"pending".to_vec())));
    reopened.stop();
}

#[test]
fn backend_outlives_cloned_handles() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_periodic(&dir, 60_000);
    let clone = store.clone();

    let mut bucket = Bucket::new(1);
    bucket.insert("k", BucketEntry::new(b"v".to_vec()));
    store.update_bucket(&bucket).unwrap();

    drop(store);
    // The shared backend is still running for the surviving handle.
    assert!(clone.load_bucket(1).unwrap().is_some());
    drop(clone);
}
