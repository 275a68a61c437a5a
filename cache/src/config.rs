use crate::error::BuildError;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The tunables of a loading cache.
///
/// Every field has a default, so a partial document (for example a JSON or
/// YAML section of a service config) deserializes into a complete config.
/// `name`, `ttl_secs` and `refresh_before_expired_secs` have no usable
/// default and must always be provided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingCacheConfig {
  /// Identifies the cache in logs and refresh worker thread names.
  pub name: String,
  /// Lifetime of a written entry, both logically and in the store.
  pub ttl_secs: u64,
  /// Entries with less than this left are refreshed in the background.
  pub refresh_before_expired_secs: u64,
  /// Maximum sustained rate of direct loader calls, per second.
  pub direct_loading_threshold: u32,
  /// Number of dedicated refresh worker threads.
  pub refresh_workers: usize,
  /// Number of refresh lock stripes keys are hashed onto.
  pub lock_stripes: usize,
  /// Keeps a key from being refreshed again while its refresh is still
  /// running. Off by default: a stripe is only held while a refresh is submitted.
  pub track_in_flight_refreshes: bool,
  /// Refreshes that can wait for a worker before triggers are rejected.
  pub refresh_queue_capacity: usize,
  /// Base wait before re-probing the store after a miss.
  pub recheck_delay_ms: u64,
  /// Upper bound of the random extra wait added to `recheck_delay_ms`.
  pub recheck_jitter_ms: u64,
  /// How long a direct load may wait for admission.
  pub admission_timeout_ms: u64,
  /// How long shutdown waits for queued refreshes.
  pub shutdown_grace_ms: u64,
}

impl LoadingCacheConfig {
  pub const DEFAULT_DIRECT_LOADING_THRESHOLD: u32 = 100;
  pub const DEFAULT_REFRESH_WORKERS: usize = 5;
  pub const DEFAULT_LOCK_STRIPES: usize = 32;
  pub const DEFAULT_REFRESH_QUEUE_CAPACITY: usize = 1024;
  pub const DEFAULT_RECHECK_DELAY_MS: u64 = 50;
  pub const DEFAULT_RECHECK_JITTER_MS: u64 = 50;
  pub const DEFAULT_ADMISSION_TIMEOUT_MS: u64 = 100;
  pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

  /// Checks the invariants `build()` relies on.
  pub fn validate(&self) -> Result<(), BuildError> {
    if self.name.trim().is_empty() {
      return Err(BuildError::BlankName);
    }
    if self.ttl_secs <= 1 {
      return Err(BuildError::InvalidTimeToLive(self.ttl_secs));
    }
    if self.refresh_before_expired_secs == 0 || self.refresh_before_expired_secs >= self.ttl_secs {
      return Err(BuildError::InvalidRefreshWindow {
        window: self.refresh_before_expired_secs,
        ttl: self.ttl_secs,
      });
    }
    if self.direct_loading_threshold == 0 {
      return Err(BuildError::ZeroLoadingThreshold);
    }
    if self.refresh_workers == 0 {
      return Err(BuildError::ZeroWorkers);
    }
    if self.lock_stripes == 0 {
      return Err(BuildError::ZeroStripes);
    }
    if self.refresh_queue_capacity == 0 {
      return Err(BuildError::ZeroQueueCapacity);
    }
    Ok(())
  }

  pub(crate) fn recheck_delay(&self) -> Duration {
    Duration::from_millis(self.recheck_delay_ms)
  }

  pub(crate) fn recheck_jitter(&self) -> Duration {
    Duration::from_millis(self.recheck_jitter_ms)
  }

  pub(crate) fn admission_timeout(&self) -> Duration {
    Duration::from_millis(self.admission_timeout_ms)
  }

  pub(crate) fn shutdown_grace(&self) -> Duration {
    Duration::from_millis(self.shutdown_grace_ms)
  }
}

impl Default for LoadingCacheConfig {
  fn default() -> Self {
    Self {
      name: String::new(),
      ttl_secs: 0,
      refresh_before_expired_secs: 0,
      direct_loading_threshold: Self::DEFAULT_DIRECT_LOADING_THRESHOLD,
      refresh_workers: Self::DEFAULT_REFRESH_WORKERS,
      lock_stripes: Self::DEFAULT_LOCK_STRIPES,
      track_in_flight_refreshes: false,
      refresh_queue_capacity: Self::DEFAULT_REFRESH_QUEUE_CAPACITY,
      recheck_delay_ms: Self::DEFAULT_RECHECK_DELAY_MS,
      recheck_jitter_ms: Self::DEFAULT_RECHECK_JITTER_MS,
      admission_timeout_ms: Self::DEFAULT_ADMISSION_TIMEOUT_MS,
      shutdown_grace_ms: Self::DEFAULT_SHUTDOWN_GRACE_MS,
    }
  }
}
