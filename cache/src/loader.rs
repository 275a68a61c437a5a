use crate::error::LoadError;

use std::sync::Arc;

/// Produces a fresh value for a key from the expensive backend.
///
/// Returning `Ok(None)` means the backend has no value for the key. Errors are
/// treated the same way and the cache never retries. A panic in a background
/// refresh is caught and logged; on a caller's thread it unwinds into `get`.
pub trait CacheLoader<V>: Send + Sync + 'static {
  fn load(&self, key: &str) -> Result<Option<V>, LoadError>;
}

impl<V, F> CacheLoader<V> for F
where
  F: Fn(&str) -> Result<Option<V>, LoadError> + Send + Sync + 'static,
{
  #[inline]
  fn load(&self, key: &str) -> Result<Option<V>, LoadError> {
    self(key)
  }
}

/// The loader as stored by the builder and the cache core.
pub(crate) type Loader<V> = Arc<dyn CacheLoader<V>>;
