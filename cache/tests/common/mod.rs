#![allow(dead_code)]

use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fibre_loading_cache::{
  CachedEntry, CodecError, EntryCodec, JsonCodec, LoadError, LoadingCache, LoadingCacheBuilder,
  MemoryStore, RemoteStore, StoreError,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  pub key: String,
  pub version: usize,
}

pub fn now_secs() -> u64 {
  SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

/// Writes `value` into `store` the way the cache would, expiring in `expires_in` seconds.
pub fn seed(store: &MemoryStore, key: &str, value: &Profile, expires_in: u64) {
  let raw = JsonCodec.encode(value, now_secs() + expires_in).unwrap();
  store.write_raw(key, &raw, expires_in.max(1)).unwrap();
}

pub fn read_back(store: &MemoryStore, key: &str) -> Option<(Profile, u64)> {
  let raw = store.read_raw(key).unwrap()?;
  let entry = EntryCodec::<Profile>::decode(&JsonCodec, &raw).unwrap();
  Some((entry.value, entry.expires_at))
}

/// A loader that counts its calls and returns a new version on every call.
pub fn counting_loader(
  calls: Arc<AtomicUsize>,
  latency: Duration,
) -> impl Fn(&str) -> Result<Option<Profile>, LoadError> + Send + Sync + 'static {
  move |key: &str| {
    let version = calls.fetch_add(1, Ordering::SeqCst) + 1;
    if !latency.is_zero() {
      thread::sleep(latency);
    }
    Ok(Some(Profile {
      key: key.to_string(),
      version,
    }))
  }
}

/// The usual test setup: TTL 10s, refresh window 3s, a short recheck delay.
pub fn builder(name: &str, store: impl RemoteStore) -> LoadingCacheBuilder<Profile> {
  LoadingCacheBuilder::new()
    .name(name)
    .time_to_live(Duration::from_secs(10))
    .refresh_before_expired(Duration::from_secs(3))
    .loading_threshold(100)
    .store(store)
    .json()
}

pub fn build_test_cache(
  name: &str,
  store: Arc<MemoryStore>,
  calls: Arc<AtomicUsize>,
  latency: Duration,
) -> LoadingCache<Profile> {
  builder(name, store)
    .loader(counting_loader(calls, latency))
    .build()
    .unwrap()
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
  let deadline = std::time::Instant::now() + timeout;
  while std::time::Instant::now() < deadline {
    if condition() {
      return true;
    }
    thread::sleep(Duration::from_millis(5));
  }
  condition()
}

/// A store whose reads and writes can be made to miss or fail on demand.
#[derive(Default)]
pub struct ScriptedStore {
  pub inner: MemoryStore,
  pub always_miss: AtomicBool,
  pub fail_reads: AtomicBool,
  pub fail_writes: AtomicBool,
  /// When non-zero, the store goes offline from this read on (1-based).
  pub offline_from_read: AtomicUsize,
  pub reads: AtomicUsize,
  pub writes: AtomicUsize,
}

impl ScriptedStore {
  fn offline_at(&self, reads: usize) -> bool {
    let from = self.offline_from_read.load(Ordering::SeqCst);
    from != 0 && reads >= from
  }
}

impl RemoteStore for ScriptedStore {
  fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
    if self.offline_at(reads) {
      return Err(StoreError::Unavailable("connection refused".to_string()));
    }
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(StoreError::Operation("WRONGTYPE".to_string()));
    }
    if self.always_miss.load(Ordering::SeqCst) {
      return Ok(None);
    }
    self.inner.read_raw(key)
  }

  fn write_raw(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), StoreError> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    if self.offline_at(self.reads.load(Ordering::SeqCst)) {
      return Err(StoreError::Unavailable("connection refused".to_string()));
    }
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(StoreError::Operation("write rejected".to_string()));
    }
    self.inner.write_raw(key, value, ttl_secs)
  }
}

/// JSON decoding, but every encode fails.
pub struct UnencodableCodec;

impl EntryCodec<Profile> for UnencodableCodec {
  fn encode(&self, _value: &Profile, _expires_at: u64) -> Result<Vec<u8>, CodecError> {
    Err(CodecError::Encode("value is not serializable".into()))
  }

  fn decode(&self, raw: &[u8]) -> Result<CachedEntry<Profile>, CodecError> {
    JsonCodec.decode(raw)
  }
}

// Sends every key to the same refresh stripe.
#[derive(Clone, Default)]
pub struct SingleStripeHasher;
impl BuildHasher for SingleStripeHasher {
  type Hasher = TestHasher;
  fn build_hasher(&self) -> Self::Hasher {
    TestHasher
  }
}
pub struct TestHasher;
impl Hasher for TestHasher {
  fn finish(&self) -> u64 {
    0
  }
  fn write(&mut self, _: &[u8]) {}
}
