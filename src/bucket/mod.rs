//! The bucket model: groups of key/entry pairs sharing a hash-derived
//! identifier, persisted one file per bucket.

pub mod codec;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

/// Milliseconds since the Unix epoch, saturating on clock skew.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .min(u128::from(u64::MAX)) as u64
}

/// A single cached value and the expiry metadata carried with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketEntry {
    pub value: Vec<u8>,
    /// Absolute expiry instant in epoch milliseconds; `None` never expires.
    #[serde(default)]
    pub expires_at_ms: Option<u64>,
}

impl BucketEntry {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            expires_at_ms: None,
        }
    }

    pub fn with_expiry(value: impl Into<Vec<u8>>, expires_at_ms: u64) -> Self {
        Self {
            value: value.into(),
            expires_at_ms: Some(expires_at_ms),
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at_ms, Some(at) if at <= now_ms)
    }
}

/// The unit of persistence: all entries whose keys hash to one bucket id.
///
/// The id is not part of the marshalled image; it is stamped from the file
/// name on load and the file name is derived from it on store.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Bucket {
    #[serde(skip)]
    id: u64,
    #[serde(default)]
    entries: HashMap<String, BucketEntry>,
}

impl Bucket {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            entries: HashMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Decimal file name this bucket persists under.
    pub fn file_name(&self) -> String {
        self.id.to_string()
    }

    pub(crate) fn stamp_id(&mut self, id: u64) {
        self.id = id;
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: BucketEntry) {
        self.entries.insert(key.into(), entry);
    }

    pub fn get(&self, key: &str) -> Option<&BucketEntry> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<BucketEntry> {
        self.entries.remove(key)
    }

    pub fn entries(&self) -> &HashMap<String, BucketEntry> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drops every expired entry; returns whether anything was removed and
    /// the bucket therefore needs rewriting.
    pub fn remove_expired_entries(&mut self, now_ms: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now_ms));
        self.entries.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_without_expiry_never_expires() {
        let entry = BucketEntry::new(b"v".to_vec());
        assert!(!entry.is_expired(u64::MAX));
    }

    #[test]
    fn entry_expires_at_its_instant() {
        let entry = BucketEntry::with_expiry(b"v".to_vec(), 100);
        assert!(!entry.is_expired(99));
        assert!(entry.is_expired(100));
        assert!(entry.is_expired(101));
    }

    #[test]
    fn remove_expired_entries_reports_removal() {
        let mut bucket = Bucket::new(7);
        bucket.insert("stale", BucketEntry::with_expiry(b"a".to_vec(), 10));
        bucket.insert("fresh", BucketEntry::with_expiry(b"b".to_vec(), 1_000));
        bucket.insert("pinned", BucketEntry::new(b"c".to_vec()));

        assert!(bucket.remove_expired_entries(500));
        assert_eq!(bucket.len(), 2);
        assert!(bucket.get("stale").is_none());

        assert!(!bucket.remove_expired_entries(500));
        assert_eq!(bucket.len(), 2);
    }

    #[test]
    fn remove_takes_the_entry_out() {
        let mut bucket = Bucket::new(7);
        bucket.insert("k", BucketEntry::new(b"v".to_vec()));
        assert_eq!(bucket.remove("k"), Some(BucketEntry::new(b"v".to_vec())));
        assert!(bucket.remove("k").is_none());
        assert!(bucket.is_empty());
    }

    #[test]
    fn file_name_is_the_decimal_id() {
        assert_eq!(Bucket::new(42).file_name(), "42");
        assert_eq!(Bucket::new(0).file_name(), "0");
    }

    #[test]
    fn id_is_not_serialized() {
        let mut bucket = Bucket::new(9);
        bucket.insert("k", BucketEntry::new(b"v".to_vec()));
        let json = serde_json::to_string(&bucket).unwrap();
        assert!(!json.contains("\"id\""));
        let back: Bucket = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), 0);
        assert_eq!(back.get("k"), bucket.get("k"));
    }
}
