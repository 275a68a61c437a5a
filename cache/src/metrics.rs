use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the loading cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Reads ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,
  pub(crate) early_refreshes: CachePadded<AtomicU64>,

  // --- Background refresh ---
  pub(crate) refreshes_scheduled: CachePadded<AtomicU64>,
  pub(crate) refreshes_suppressed: CachePadded<AtomicU64>,
  pub(crate) refreshes_rejected: CachePadded<AtomicU64>,
  pub(crate) refreshes_succeeded: CachePadded<AtomicU64>,
  pub(crate) refreshes_failed: CachePadded<AtomicU64>,

  // --- Loader protection ---
  pub(crate) loader_calls: CachePadded<AtomicU64>,
  pub(crate) loads_shed: CachePadded<AtomicU64>,

  // --- Failures ---
  pub(crate) store_unavailable: CachePadded<AtomicU64>,
  pub(crate) decode_failures: CachePadded<AtomicU64>,
  pub(crate) write_failures: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      early_refreshes: CachePadded::new(AtomicU64::new(0)),
      refreshes_scheduled: CachePadded::new(AtomicU64::new(0)),
      refreshes_suppressed: CachePadded::new(AtomicU64::new(0)),
      refreshes_rejected: CachePadded::new(AtomicU64::new(0)),
      refreshes_succeeded: CachePadded::new(AtomicU64::new(0)),
      refreshes_failed: CachePadded::new(AtomicU64::new(0)),
      loader_calls: CachePadded::new(AtomicU64::new(0)),
      loads_shed: CachePadded::new(AtomicU64::new(0)),
      store_unavailable: CachePadded::new(AtomicU64::new(0)),
      decode_failures: CachePadded::new(AtomicU64::new(0)),
      write_failures: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &CachePadded<AtomicU64>) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      early_refreshes: self.early_refreshes.load(Ordering::Relaxed),
      refreshes_scheduled: self.refreshes_scheduled.load(Ordering::Relaxed),
      refreshes_suppressed: self.refreshes_suppressed.load(Ordering::Relaxed),
      refreshes_rejected: self.refreshes_rejected.load(Ordering::Relaxed),
      refreshes_succeeded: self.refreshes_succeeded.load(Ordering::Relaxed),
      refreshes_failed: self.refreshes_failed.load(Ordering::Relaxed),
      loader_calls: self.loader_calls.load(Ordering::Relaxed),
      loads_shed: self.loads_shed.load(Ordering::Relaxed),
      store_unavailable: self.store_unavailable.load(Ordering::Relaxed),
      decode_failures: self.decode_failures.load(Ordering::Relaxed),
      write_failures: self.write_failures.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Reads answered from a decodable store entry.
  pub hits: u64,
  /// Reads that found no entry (or a blank one) on the first read.
  pub misses: u64,
  /// The cache hit ratio (hits / (hits + misses)).
  pub hit_ratio: f64,
  /// Hits whose entry was inside the early-refresh window.
  pub early_refreshes: u64,
  /// Background refreshes handed to the worker pool.
  pub refreshes_scheduled: u64,
  /// Refresh triggers dropped because the key's slot was busy.
  pub refreshes_suppressed: u64,
  /// Refresh triggers dropped because the worker queue was full or closed.
  pub refreshes_rejected: u64,
  /// Background refreshes that wrote a new value.
  pub refreshes_succeeded: u64,
  /// Background refreshes that ended in an error.
  pub refreshes_failed: u64,
  /// Invocations of the loader, foreground and background.
  pub loader_calls: u64,
  /// Direct loads refused by the admission limiter.
  pub loads_shed: u64,
  /// Store calls that failed with a connectivity error.
  pub store_unavailable: u64,
  /// Store entries that could not be decoded.
  pub decode_failures: u64,
  /// Loaded values that could not be encoded or written back.
  pub write_failures: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("early_refreshes", &self.early_refreshes)
      .field("refreshes_scheduled", &self.refreshes_scheduled)
      .field("refreshes_suppressed", &self.refreshes_suppressed)
      .field("refreshes_rejected", &self.refreshes_rejected)
      .field("refreshes_succeeded", &self.refreshes_succeeded)
      .field("refreshes_failed", &self.refreshes_failed)
      .field("loader_calls", &self.loader_calls)
      .field("loads_shed", &self.loads_shed)
      .field("store_unavailable", &self.store_unavailable)
      .field("decode_failures", &self.decode_failures)
      .field("write_failures", &self.write_failures)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
