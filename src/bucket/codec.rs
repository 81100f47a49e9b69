//! Codec bridge between buckets and their on-disk byte images.

use super::Bucket;
use thiserror::Error;

/// Externally supplied codec converting a bucket to and from bytes.
///
/// Implementations must be thread-safe; the store shares one marshaller
/// across every operation. A byte image is always a complete bucket:
/// zero-length files are handled by the store before the codec is asked.
pub trait Marshaller: Send + Sync {
    fn to_bytes(&self, bucket: &Bucket) -> Result<Vec<u8>, MarshalError>;
    fn from_bytes(&self, bytes: &[u8]) -> Result<Bucket, MarshalError>;
}

#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("bucket serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Default marshaller persisting buckets as JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshaller;

impl Marshaller for JsonMarshaller {
    fn to_bytes(&self, bucket: &Bucket) -> Result<Vec<u8>, MarshalError> {
        Ok(serde_json::to_vec(bucket)?)
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<Bucket, MarshalError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
