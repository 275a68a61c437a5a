//! Conversion between cached values and the bytes kept in the remote store.

use crate::entry::CachedEntry;
use crate::error::CodecError;

/// Serializes a value with its expiration, and back.
///
/// Implementations must be pure: the same input always yields the same
/// output and no state is shared between calls.
pub trait EntryCodec<V>: Send + Sync + 'static {
  /// Encodes `value` with the absolute expiration `expires_at` (seconds since the epoch).
  fn encode(&self, value: &V, expires_at: u64) -> Result<Vec<u8>, CodecError>;

  /// Decodes bytes previously produced by [`encode`](EntryCodec::encode).
  fn decode(&self, raw: &[u8]) -> Result<CachedEntry<V>, CodecError>;
}

/// Stores entries as JSON objects of the form `{"value": ..., "expires_at": ...}`.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl<V> EntryCodec<V> for JsonCodec
where
  V: serde::Serialize + serde::de::DeserializeOwned + 'static,
{
  fn encode(&self, value: &V, expires_at: u64) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(&CachedEntry::new(value, expires_at)).map_err(|e| CodecError::Encode(Box::new(e)))
  }

  fn decode(&self, raw: &[u8]) -> Result<CachedEntry<V>, CodecError> {
    serde_json::from_slice(raw).map_err(|e| CodecError::Decode(Box::new(e)))
  }
}
