use crate::error::StoreError;

use core::fmt;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

/// The remote key/value store the cache keeps populated.
///
/// Implementations are called concurrently from caller threads and refresh
/// workers, and must report connectivity problems as
/// [`StoreError::Unavailable`] so the cache can fall back to direct loading.
pub trait RemoteStore: Send + Sync + 'static {
  /// Reads the raw bytes stored under `key`, or `None` if there are none.
  fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

  /// Writes `value` under `key`, to be physically removed after `ttl_secs`.
  fn write_raw(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), StoreError>;
}

impl<S: RemoteStore + ?Sized> RemoteStore for Arc<S> {
  fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    (**self).read_raw(key)
  }

  fn write_raw(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), StoreError> {
    (**self).write_raw(key, value, ttl_secs)
  }
}

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<K: Hash + ?Sized, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

#[derive(Debug)]
struct StoredValue {
  bytes: Vec<u8>,
  expires_at: Instant,
}

impl StoredValue {
  #[inline]
  fn is_expired(&self, now: Instant) -> bool {
    now >= self.expires_at
  }
}

type Shard = CachePadded<RwLock<HashMap<String, StoredValue, ahash::RandomState>>>;

/// An in-process [`RemoteStore`] with per-key TTL.
///
/// Entries are partitioned into independently locked shards and expire
/// lazily: an expired entry is invisible to reads and stays in memory until
/// it is overwritten or [`purge_expired`](Self::purge_expired) runs. The store can be switched "offline", after which every
/// call fails with [`StoreError::Unavailable`], to exercise the cache's
/// degraded mode.
pub struct MemoryStore {
  shards: Box<[Shard]>,
  hasher: ahash::RandomState,
  available: AtomicBool,
}

impl fmt::Debug for MemoryStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryStore")
      .field("num_shards", &self.shards.len())
      .field("available", &self.is_available())
      .finish()
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  const DEFAULT_SHARDS: usize = 16;

  pub fn new() -> Self {
    Self::with_shards(Self::DEFAULT_SHARDS)
  }

  /// Creates a store with `num_shards` independently locked partitions (at least one).
  pub fn with_shards(num_shards: usize) -> Self {
    let hasher = ahash::RandomState::new();
    let mut shards = Vec::with_capacity(num_shards.max(1));
    for _ in 0..num_shards.max(1) {
      let shard_map = HashMap::with_hasher(hasher.clone());
      shards.push(CachePadded::new(RwLock::new(shard_map)));
    }

    Self {
      shards: shards.into_boxed_slice(),
      hasher,
      available: AtomicBool::new(true),
    }
  }

  /// Switches the store online or offline.
  pub fn set_available(&self, available: bool) {
    self.available.store(available, Ordering::SeqCst);
  }

  pub fn is_available(&self) -> bool {
    self.available.load(Ordering::SeqCst)
  }

  /// Stores `value` with a sub-second precision TTL.
  pub fn insert_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) {
    let now = Instant::now();
    self.shard(key).write().insert(
      key.to_string(),
      StoredValue {
        bytes: value.to_vec(),
        expires_at: now + ttl,
      },
    );
  }

  /// Removes `key`, returning whether a live entry was present.
  pub fn remove(&self, key: &str) -> bool {
    let now = Instant::now();
    self
      .shard(key)
      .write()
      .remove(key)
      .is_some_and(|stored| !stored.is_expired(now))
  }

  /// The time `key` has left before the store drops it.
  pub fn ttl(&self, key: &str) -> Option<Duration> {
    let now = Instant::now();
    let guard = self.shard(key).read();
    guard
      .get(key)
      .filter(|stored| !stored.is_expired(now))
      .map(|stored| stored.expires_at - now)
  }

  /// Drops every expired entry, returning how many were removed.
  pub fn purge_expired(&self) -> usize {
    let now = Instant::now();
    let mut purged = 0;
    for shard in self.shards.iter() {
      let mut guard = shard.write();
      let before = guard.len();
      guard.retain(|_, stored| !stored.is_expired(now));
      purged += before - guard.len();
    }
    purged
  }

  /// The number of live entries.
  pub fn len(&self) -> usize {
    let now = Instant::now();
    self
      .shards
      .iter()
      .map(|shard| shard.read().values().filter(|s| !s.is_expired(now)).count())
      .sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[inline]
  fn shard(&self, key: &str) -> &RwLock<HashMap<String, StoredValue, ahash::RandomState>> {
    let index = hash_key(&self.hasher, key) as usize % self.shards.len();
    &self.shards[index]
  }

  fn check_available(&self) -> Result<(), StoreError> {
    if self.is_available() {
      Ok(())
    } else {
      Err(StoreError::Unavailable("memory store is offline".to_string()))
    }
  }
}

impl RemoteStore for MemoryStore {
  fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    self.check_available()?;
    let now = Instant::now();
    let guard = self.shard(key).read();
    Ok(
      guard
        .get(key)
        .filter(|stored| !stored.is_expired(now))
        .map(|stored| stored.bytes.clone()),
    )
  }

  fn write_raw(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), StoreError> {
    self.check_available()?;
    if ttl_secs == 0 {
      return Err(StoreError::Operation(format!(
        "invalid expire time for key {key}"
      )));
    }
    self.insert_with_ttl(key, value, Duration::from_secs(ttl_secs));
    Ok(())
  }
}
