use crate::codec::EntryCodec;
use crate::config::LoadingCacheConfig;
use crate::error::{BuildError, LoadError};
use crate::guard::RefreshGuard;
use crate::handles::LoadingCache;
use crate::limiter::AdmissionLimiter;
use crate::loader::{CacheLoader, Loader};
use crate::metrics::Metrics;
use crate::shared::{CacheShared, RefreshContext};
use crate::store::RemoteStore;
use crate::task::refresher::RefreshPool;

use core::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::Duration;

/// A builder for creating `LoadingCache` instances.
///
/// The type parameter `H` is the hasher used to spread keys over the refresh
/// lock stripes.
pub struct LoadingCacheBuilder<V, H = ahash::RandomState> {
  config: LoadingCacheConfig,
  hasher: H,
  store: Option<Arc<dyn RemoteStore>>,
  codec: Option<Arc<dyn EntryCodec<V>>>,
  loader: Option<Loader<V>>,
}

// Manual Debug implementation for LoadingCacheBuilder.
impl<V, H> fmt::Debug for LoadingCacheBuilder<V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LoadingCacheBuilder")
      .field("config", &self.config)
      .field("has_store", &self.store.is_some())
      .field("has_codec", &self.codec.is_some())
      .field("has_loader", &self.loader.is_some())
      .finish_non_exhaustive()
  }
}

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
#[inline]
fn saturating_millis(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// --- Default Constructor ---
impl<V: 'static> LoadingCacheBuilder<V, ahash::RandomState> {
  /// Creates a new `LoadingCacheBuilder` with default settings.
  pub fn new() -> Self {
    Self {
      config: LoadingCacheConfig::default(),
      hasher: ahash::RandomState::new(),
      store: None,
      codec: None,
      loader: None,
    }
  }
}

impl<V: 'static> Default for LoadingCacheBuilder<V, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

// --- General Configuration Methods ---
impl<V: 'static, H> LoadingCacheBuilder<V, H> {
  /// Replaces every tunable at once, e.g. with a deserialized config section.
  pub fn config(mut self, config: LoadingCacheConfig) -> Self {
    self.config = config;
    self
  }

  /// Sets the name used in logs and refresh worker thread names.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.config.name = name.into();
    self
  }

  /// Sets the lifetime of written entries. Truncated to whole seconds.
  pub fn time_to_live(mut self, duration: Duration) -> Self {
    self.config.ttl_secs = duration.as_secs();
    self
  }

  /// Sets the early-refresh window. Truncated to whole seconds.
  ///
  /// An entry with less than this left before its logical expiration is
  /// returned as-is and refreshed in the background.
  pub fn refresh_before_expired(mut self, duration: Duration) -> Self {
    self.config.refresh_before_expired_secs = duration.as_secs();
    self
  }

  /// Sets the maximum sustained rate of direct loader calls per second.
  ///
  /// Defaults to `100`.
  pub fn loading_threshold(mut self, loads_per_second: u32) -> Self {
    self.config.direct_loading_threshold = loads_per_second;
    self
  }

  /// Sets the number of refresh worker threads. Defaults to `5`.
  pub fn refresh_workers(mut self, workers: usize) -> Self {
    self.config.refresh_workers = workers;
    self
  }

  /// Sets the number of refresh lock stripes. Defaults to `32`.
  pub fn lock_stripes(mut self, stripes: usize) -> Self {
    self.config.lock_stripes = stripes;
    self
  }

  /// Suppresses a key's early refresh while a previous refresh of the same
  /// key is still running. Defaults to `false`.
  pub fn track_in_flight_refreshes(mut self, enabled: bool) -> Self {
    self.config.track_in_flight_refreshes = enabled;
    self
  }

  /// Sets how many refreshes may queue for a worker. Defaults to `1024`.
  pub fn refresh_queue_capacity(mut self, capacity: usize) -> Self {
    self.config.refresh_queue_capacity = capacity;
    self
  }

  /// Sets the base wait before re-probing the store after a miss.
  pub fn recheck_delay(mut self, delay: Duration) -> Self {
    self.config.recheck_delay_ms = saturating_millis(delay);
    self
  }

  /// Sets the upper bound of the random wait added to the recheck delay.
  pub fn recheck_jitter(mut self, jitter: Duration) -> Self {
    self.config.recheck_jitter_ms = saturating_millis(jitter);
    self
  }

  /// Sets how long a direct load waits for admission before giving up.
  pub fn admission_timeout(mut self, timeout: Duration) -> Self {
    self.config.admission_timeout_ms = saturating_millis(timeout);
    self
  }

  /// Sets how long shutdown waits for queued refreshes.
  pub fn shutdown_grace(mut self, grace: Duration) -> Self {
    self.config.shutdown_grace_ms = saturating_millis(grace);
    self
  }

  /// Sets the remote store the cache reads from and writes to.
  pub fn store(mut self, store: impl RemoteStore) -> Self {
    self.store = Some(Arc::new(store));
    self
  }

  /// Sets the codec that turns values into store payloads.
  pub fn codec(mut self, codec: impl EntryCodec<V>) -> Self {
    self.codec = Some(Arc::new(codec));
    self
  }

  /// Sets the loader function.
  ///
  /// `Ok(None)` means the backend has no value; errors are logged and treated
  /// the same way.
  pub fn loader(
    mut self,
    f: impl Fn(&str) -> Result<Option<V>, LoadError> + Send + Sync + 'static,
  ) -> Self {
    self.loader = Some(Arc::new(f));
    self
  }

  /// Sets a [`CacheLoader`] implementation as the loader.
  pub fn cache_loader(mut self, loader: impl CacheLoader<V>) -> Self {
    self.loader = Some(Arc::new(loader));
    self
  }

  /// Sets the hasher used to assign keys to refresh lock stripes.
  pub fn hasher<NewH>(self, hasher: NewH) -> LoadingCacheBuilder<V, NewH> {
    LoadingCacheBuilder {
      config: self.config,
      hasher,
      store: self.store,
      codec: self.codec,
      loader: self.loader,
    }
  }
}

#[cfg(feature = "json")]
impl<V, H> LoadingCacheBuilder<V, H>
where
  V: serde::Serialize + serde::de::DeserializeOwned + 'static,
{
  /// Stores entries as JSON using [`JsonCodec`](crate::JsonCodec).
  pub fn json(self) -> Self {
    self.codec(crate::codec::JsonCodec)
  }
}

impl<V, H> LoadingCacheBuilder<V, H>
where
  V: 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  /// Validates the configuration, starts the refresh workers and returns the cache.
  pub fn build(self) -> Result<LoadingCache<V, H>, BuildError> {
    let config = self.config;
    config.validate()?;

    let store = self.store.ok_or(BuildError::MissingStore)?;
    let codec = self.codec.ok_or(BuildError::MissingCodec)?;
    let loader = self.loader.ok_or(BuildError::MissingLoader)?;

    let pool = RefreshPool::spawn(
      &config.name,
      config.refresh_workers,
      config.refresh_queue_capacity,
    )
    .map_err(|e| BuildError::WorkerSpawn(e.to_string()))?;

    let context = RefreshContext {
      store,
      codec,
      loader,
      limiter: AdmissionLimiter::new(config.direct_loading_threshold),
      guard: RefreshGuard::new(
        config.lock_stripes,
        self.hasher,
        config.track_in_flight_refreshes,
      ),
      metrics: Metrics::new(),
      ttl_secs: config.ttl_secs,
      refresh_before_expired_secs: config.refresh_before_expired_secs,
      admission_timeout: config.admission_timeout(),
      recheck_delay: config.recheck_delay(),
      recheck_jitter: config.recheck_jitter(),
      name: config.name.clone(),
    };

    Ok(LoadingCache {
      shared: Arc::new(CacheShared {
        context: Arc::new(context),
        pool,
        shutdown_grace: config.shutdown_grace(),
      }),
    })
  }
}
