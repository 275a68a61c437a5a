use crate::builder::LoadingCacheBuilder;
use crate::entry::CachedEntry;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::shared::CacheShared;
use crate::time;

use std::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error};

/// A stampede-protected, read-through view of a remote cache store.
///
/// Cloning is cheap and every clone shares the same store, loader, refresh
/// guard, admission limiter and refresh workers. The workers are shut down
/// when the last clone is dropped, or earlier via [`shutdown`](Self::shutdown).
pub struct LoadingCache<V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<V, H>>,
}

impl<V, H> Clone for LoadingCache<V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<V, H> fmt::Debug for LoadingCache<V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LoadingCache")
      .field("shared", &self.shared)
      .finish()
  }
}

impl<V: 'static> LoadingCache<V> {
  /// Starts building a cache with the default stripe hasher.
  pub fn builder() -> LoadingCacheBuilder<V> {
    LoadingCacheBuilder::new()
  }
}

impl<V, H> LoadingCache<V, H>
where
  V: 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  /// Returns the value for `key`, loading it if needed.
  ///
  /// A fresh entry is returned after a single store read. An entry close to
  /// expiry is returned as well and refreshed in the background. For a missing
  /// entry the caller schedules a background load, waits briefly, reads the
  /// store again and, if it is still missing, loads the value itself through
  /// the admission limiter. If the store is unreachable the value is loaded
  /// directly through the limiter.
  ///
  /// `None` means no value could be produced right now: the loader had none
  /// or failed, the direct-load budget was exhausted, or the stored entry is
  /// corrupt. Callers may retry on their own schedule.
  pub fn get(&self, key: &str) -> Option<V> {
    if key.is_empty() {
      debug!(cache = %self.name(), "ignoring lookup of empty key");
      return None;
    }

    let context = &self.shared.context;
    match context.read(key) {
      Ok(Some(raw)) => return self.serve(key, &raw),
      Ok(None) => {}
      Err(e) if e.is_unavailable() => {
        Metrics::incr(&context.metrics.store_unavailable);
        error!(cache = %context.name, key, error = %e, "cache store is unavailable, trying to load directly");
        return context.load_directly(key, false);
      }
      Err(e) => {
        error!(cache = %context.name, key, error = %e, "failed to read from cache store");
        return None;
      }
    }

    Metrics::incr(&context.metrics.misses);

    // Give a background load the chance to land before loading ourselves.
    self.shared.trigger_refresh(key);
    self.wait_shortly();

    match context.read(key) {
      Ok(Some(raw)) => context.decode(key, &raw).map(CachedEntry::into_value),
      Ok(None) => context.load_directly(key, true),
      Err(e) if e.is_unavailable() => {
        Metrics::incr(&context.metrics.store_unavailable);
        error!(cache = %context.name, key, error = %e, "cache store is unavailable, trying to load directly");
        context.load_directly(key, false)
      }
      Err(e) => {
        error!(cache = %context.name, key, error = %e, "failed to read from cache store");
        None
      }
    }
  }

  /// Answers a lookup from a present entry, scheduling an early refresh if
  /// the entry is about to expire.
  fn serve(&self, key: &str, raw: &[u8]) -> Option<V> {
    let context = &self.shared.context;
    let entry = context.decode(key, raw)?;
    Metrics::incr(&context.metrics.hits);

    if time::remaining_secs(entry.expires_at) < context.refresh_before_expired_secs as i64 {
      Metrics::incr(&context.metrics.early_refreshes);
      self.shared.trigger_refresh(key);
    }

    Some(entry.into_value())
  }

  fn wait_shortly(&self) {
    let context = &self.shared.context;
    let jitter_ms = u64::try_from(context.recheck_jitter.as_millis()).unwrap_or(u64::MAX);
    let jitter = if jitter_ms > 1 {
      Duration::from_millis(rand::rng().random_range(1..jitter_ms))
    } else {
      Duration::ZERO
    };
    thread::sleep(context.recheck_delay + jitter);
  }

  /// The name given at construction, used in logs and worker thread names.
  pub fn name(&self) -> &str {
    &self.shared.context.name
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.context.metrics.snapshot()
  }

  /// Stops the refresh workers.
  ///
  /// New refresh triggers are rejected from now on; `get` keeps working, with
  /// misses resolved by direct loads only. Queued refreshes get the configured
  /// grace period to finish, after which the rest are dropped.
  pub fn shutdown(&self) {
    self.shared.pool.shutdown(self.shared.shutdown_grace);
  }
}
