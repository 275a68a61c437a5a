use crate::codec::EntryCodec;
use crate::entry::{self, CachedEntry};
use crate::error::{RefreshError, StoreError};
use crate::guard::{InFlight, RefreshGuard};
use crate::limiter::AdmissionLimiter;
use crate::loader::Loader;
use crate::metrics::Metrics;
use crate::store::RemoteStore;
use crate::task::refresher::{Job, RefreshPool};
use crate::time;

use std::fmt;
use std::hash::BuildHasher;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

/// Everything a refresh needs, shared between caller threads and the
/// refresh workers. Holds no reference to the worker pool, so queued jobs
/// never keep the pool alive.
pub(crate) struct RefreshContext<V, H> {
  pub(crate) name: String,
  pub(crate) store: Arc<dyn RemoteStore>,
  pub(crate) codec: Arc<dyn EntryCodec<V>>,
  pub(crate) loader: Loader<V>,
  pub(crate) limiter: AdmissionLimiter,
  pub(crate) guard: RefreshGuard<H>,
  pub(crate) metrics: Metrics,
  pub(crate) ttl_secs: u64,
  pub(crate) refresh_before_expired_secs: u64,
  pub(crate) admission_timeout: Duration,
  pub(crate) recheck_delay: Duration,
  pub(crate) recheck_jitter: Duration,
}

impl<V: 'static, H> RefreshContext<V, H> {
  /// Reads the raw entry for `key`. Blank payloads count as absent.
  pub(crate) fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    Ok(self.store.read_raw(key)?.filter(|raw| !entry::is_blank(raw)))
  }

  pub(crate) fn decode(&self, key: &str, raw: &[u8]) -> Option<CachedEntry<V>> {
    match self.codec.decode(raw) {
      Ok(entry) => Some(entry),
      Err(e) => {
        Metrics::incr(&self.metrics.decode_failures);
        error!(cache = %self.name, key, len = raw.len(), error = %e, "failed to deserialize cached entry");
        None
      }
    }
  }

  /// Calls the loader if the admission limiter lets us through in time.
  pub(crate) fn protected_load(&self, key: &str) -> Result<Option<V>, RefreshError> {
    if !self.limiter.try_acquire(self.admission_timeout) {
      Metrics::incr(&self.metrics.loads_shed);
      return Err(RefreshError::Shed {
        key: key.to_string(),
        threshold: self.limiter.permits_per_second(),
      });
    }

    Metrics::incr(&self.metrics.loader_calls);
    self.loader.load(key).map_err(|source| RefreshError::Load {
      key: key.to_string(),
      source,
    })
  }

  /// Stamps `value` with `now + ttl` and writes it with a store TTL of `ttl`.
  pub(crate) fn write_back(&self, key: &str, value: &V) -> Result<(), RefreshError> {
    let expires_at = time::expires_in(self.ttl_secs);
    let raw = self.codec.encode(value, expires_at).map_err(|source| {
      Metrics::incr(&self.metrics.write_failures);
      RefreshError::Encode {
        key: key.to_string(),
        source,
      }
    })?;

    self
      .store
      .write_raw(key, &raw, self.ttl_secs)
      .map_err(|source| {
        Metrics::incr(&self.metrics.write_failures);
        RefreshError::Write {
          key: key.to_string(),
          source,
        }
      })
  }

  /// A protected load on the caller's thread. Every failure resolves to `None`.
  ///
  /// When `write_back` is set, a loaded value is also written to the store; a
  /// failed write is logged and the value is returned anyway.
  pub(crate) fn load_directly(&self, key: &str, write_back: bool) -> Option<V> {
    match self.protected_load(key) {
      Ok(Some(value)) => {
        if write_back {
          if let Err(e) = self.write_back(key, &value) {
            error!(cache = %self.name, key, error = %e, "failed to write loaded value to cache store");
          }
        }
        Some(value)
      }
      Ok(None) => {
        debug!(cache = %self.name, key, "loader returned no value");
        None
      }
      Err(RefreshError::Shed { threshold, .. }) => {
        warn!(
          cache = %self.name,
          key,
          "failed to load value directly due to the traffic exceeds threshold: {}",
          threshold
        );
        None
      }
      Err(e) => {
        error!(cache = %self.name, key, error = %e, "failed to load value directly");
        None
      }
    }
  }

  /// The body of a background refresh. Never panics and never returns an error.
  ///
  /// A tracked key is released as soon as the reload is over, before the
  /// outcome is recorded.
  pub(crate) fn refresh(&self, key: &str, in_flight: Option<InFlight>) {
    debug!(cache = %self.name, key, "refreshing in background");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.reload(key))).unwrap_or_else(|_| {
      Err(RefreshError::Panicked {
        key: key.to_string(),
      })
    });
    drop(in_flight);

    match outcome {
      Ok(true) => {
        Metrics::incr(&self.metrics.refreshes_succeeded);
        debug!(cache = %self.name, key, "refreshed successfully");
      }
      Ok(false) => {
        debug!(cache = %self.name, key, "loader returned no value, nothing refreshed");
      }
      Err(e @ RefreshError::Shed { .. }) => {
        Metrics::incr(&self.metrics.refreshes_failed);
        warn!(cache = %self.name, key, "{}", e);
      }
      Err(e) => {
        Metrics::incr(&self.metrics.refreshes_failed);
        error!(cache = %self.name, key, error = %e, "failed to async load cached key");
      }
    }
  }

  fn reload(&self, key: &str) -> Result<bool, RefreshError> {
    let Some(value) = self.protected_load(key)? else {
      return Ok(false);
    };
    self.write_back(key, &value)?;
    Ok(true)
  }
}

/// The internal core behind every clone of a `LoadingCache`.
pub(crate) struct CacheShared<V, H> {
  pub(crate) context: Arc<RefreshContext<V, H>>,
  pub(crate) pool: RefreshPool,
  pub(crate) shutdown_grace: Duration,
}

impl<V, H> fmt::Debug for CacheShared<V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("name", &self.context.name)
      .field("ttl_secs", &self.context.ttl_secs)
      .field(
        "refresh_before_expired_secs",
        &self.context.refresh_before_expired_secs,
      )
      .field("guard", &self.context.guard)
      .field("limiter", &self.context.limiter)
      .field("metrics", &self.context.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<V, H> Drop for CacheShared<V, H> {
  fn drop(&mut self) {
    self.pool.shutdown(self.shutdown_grace);
  }
}

impl<V, H> CacheShared<V, H>
where
  V: 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  /// Fire-and-forget refresh of `key`.
  ///
  /// Only the caller that claims the key's slot submits a job; everyone else
  /// returns immediately. The slot is released once the job is handed to the
  /// pool. Returns whether a job was submitted.
  pub(crate) fn trigger_refresh(&self, key: &str) -> bool {
    let context = &self.context;
    let Some(mut claim) = context.guard.try_claim(key) else {
      Metrics::incr(&context.metrics.refreshes_suppressed);
      return false;
    };

    debug!(cache = %context.name, key, "async loading cache");
    let job: Job = {
      let context = Arc::clone(context);
      let key = key.to_string();
      // A tracked key stays in flight until this job has run or is dropped unrun.
      let in_flight = claim.take_in_flight();
      Box::new(move || context.refresh(&key, in_flight))
    };

    let submitted = self.pool.try_submit(job);
    drop(claim);

    match submitted {
      Ok(()) => {
        Metrics::incr(&context.metrics.refreshes_scheduled);
        true
      }
      Err(reason) => {
        Metrics::incr(&context.metrics.refreshes_rejected);
        warn!(cache = %context.name, key, ?reason, "background refresh not scheduled");
        false
      }
    }
  }
}
