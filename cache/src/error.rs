use thiserror::Error;

/// The error type a loader, store or codec may use to report an arbitrary failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failure reported by a [`CacheLoader`](crate::CacheLoader).
///
/// The cache never surfaces this to `get` callers; any loader failure is
/// treated as "no value produced".
pub type LoadError = BoxError;

/// Errors that can occur when building a loading cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// The cache name is empty or whitespace. It is used in logs and worker thread names.
  #[error("cache name must not be blank")]
  BlankName,
  /// The time-to-live must be larger than one second.
  #[error("time to live must be larger than 1 second, got {0}s")]
  InvalidTimeToLive(u64),
  /// The early-refresh window must be positive and strictly shorter than the TTL.
  #[error("refresh before expired ({window}s) must be larger than 0 and smaller than the time to live ({ttl}s)")]
  InvalidRefreshWindow { window: u64, ttl: u64 },
  /// The direct loading threshold (loads per second) must be positive.
  #[error("direct loading threshold must be larger than 0")]
  ZeroLoadingThreshold,
  /// At least one background refresh worker is required.
  #[error("refresh worker count cannot be zero")]
  ZeroWorkers,
  /// At least one refresh lock stripe is required.
  #[error("refresh lock stripe count cannot be zero")]
  ZeroStripes,
  /// The refresh queue must be able to hold at least one task.
  #[error("refresh queue capacity cannot be zero")]
  ZeroQueueCapacity,
  /// No remote store was configured.
  #[error("a remote store is required")]
  MissingStore,
  /// No loader was configured.
  #[error("a loader is required")]
  MissingLoader,
  /// No entry codec was configured.
  #[error("an entry codec is required")]
  MissingCodec,
  /// A background refresh worker thread could not be started.
  #[error("failed to spawn refresh worker: {0}")]
  WorkerSpawn(String),
}

/// Errors reported by a [`RemoteStore`](crate::RemoteStore).
#[derive(Debug, Error)]
pub enum StoreError {
  /// The store could not be reached. `get` degrades to a protected direct load.
  #[error("cache store is unavailable: {0}")]
  Unavailable(String),
  /// The store was reached but rejected or failed the operation.
  #[error("cache store operation failed: {0}")]
  Operation(String),
}

impl StoreError {
  /// Returns `true` if this is a connectivity failure.
  pub fn is_unavailable(&self) -> bool {
    matches!(self, StoreError::Unavailable(_))
  }
}

/// Errors reported by an [`EntryCodec`](crate::EntryCodec).
#[derive(Debug, Error)]
pub enum CodecError {
  #[error("failed to encode cache entry: {0}")]
  Encode(#[source] BoxError),
  #[error("failed to decode cache entry: {0}")]
  Decode(#[source] BoxError),
}

/// A failure of a single background refresh.
///
/// Refreshes are fire-and-forget: these errors are only logged and counted,
/// never returned to a `get` caller.
#[derive(Debug, Error)]
pub enum RefreshError {
  #[error("error occurred when loading key: {key}")]
  Load {
    key: String,
    #[source]
    source: LoadError,
  },
  #[error("loader panicked while loading key: {key}")]
  Panicked { key: String },
  #[error("direct loading of key {key} exceeds the threshold of {threshold} loads per second")]
  Shed { key: String, threshold: u32 },
  #[error("failed to encode refreshed value for key: {key}")]
  Encode {
    key: String,
    #[source]
    source: CodecError,
  },
  #[error("failed to write refreshed value for key: {key}")]
  Write {
    key: String,
    #[source]
    source: StoreError,
  },
}
