mod common;

use common::*;
use fibre_loading_cache::{
  BuildError, CacheLoader, LoadError, LoadingCache, LoadingCacheBuilder, LoadingCacheConfig,
  MemoryStore,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn noop_loader(_: &str) -> Result<Option<Profile>, LoadError> {
  Ok(None)
}

#[test]
fn test_builder_requires_store_codec_and_loader() {
  let missing_store = LoadingCacheBuilder::<Profile>::new()
    .name("parts")
    .time_to_live(Duration::from_secs(10))
    .refresh_before_expired(Duration::from_secs(3))
    .json()
    .loader(noop_loader)
    .build();
  assert_eq!(missing_store.unwrap_err(), BuildError::MissingStore);

  let missing_codec = LoadingCacheBuilder::<Profile>::new()
    .name("parts")
    .time_to_live(Duration::from_secs(10))
    .refresh_before_expired(Duration::from_secs(3))
    .store(MemoryStore::new())
    .loader(noop_loader)
    .build();
  assert_eq!(missing_codec.unwrap_err(), BuildError::MissingCodec);

  let missing_loader = builder("parts", MemoryStore::new()).build();
  assert_eq!(missing_loader.unwrap_err(), BuildError::MissingLoader);
}

#[test]
fn test_builder_rejects_invalid_settings() {
  let blank = builder("  ", MemoryStore::new()).loader(noop_loader).build();
  assert_eq!(blank.unwrap_err(), BuildError::BlankName);

  let ttl = builder("bad-ttl", MemoryStore::new())
    .time_to_live(Duration::from_secs(1))
    .refresh_before_expired(Duration::from_secs(1))
    .loader(noop_loader)
    .build();
  assert_eq!(ttl.unwrap_err(), BuildError::InvalidTimeToLive(1));

  let window = builder("bad-window", MemoryStore::new())
    .refresh_before_expired(Duration::from_secs(10))
    .loader(noop_loader)
    .build();
  assert_eq!(
    window.unwrap_err(),
    BuildError::InvalidRefreshWindow { window: 10, ttl: 10 }
  );

  let threshold = builder("bad-threshold", MemoryStore::new())
    .loading_threshold(0)
    .loader(noop_loader)
    .build();
  assert_eq!(threshold.unwrap_err(), BuildError::ZeroLoadingThreshold);
}

#[test]
fn test_default_config_is_rejected_until_ttl_is_set() {
  let result = LoadingCacheBuilder::<Profile>::new()
    .name("no-ttl")
    .store(MemoryStore::new())
    .json()
    .loader(noop_loader)
    .build();
  assert_eq!(result.unwrap_err(), BuildError::InvalidTimeToLive(0));
}

#[test]
fn test_oversized_durations_saturate() {
  let configured = builder("huge", MemoryStore::new())
    .recheck_delay(Duration::MAX)
    .admission_timeout(Duration::MAX)
    .shutdown_grace(Duration::MAX);

  let debug = format!("{configured:?}");
  assert!(debug.contains(&format!("recheck_delay_ms: {}", u64::MAX)), "{debug}");
  assert!(debug.contains(&format!("admission_timeout_ms: {}", u64::MAX)), "{debug}");
  assert!(debug.contains(&format!("shutdown_grace_ms: {}", u64::MAX)), "{debug}");
}

struct VersionedLoader {
  version: usize,
  calls: Arc<AtomicUsize>,
}

impl CacheLoader<Profile> for VersionedLoader {
  fn load(&self, key: &str) -> Result<Option<Profile>, LoadError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(Some(Profile {
      key: key.to_string(),
      version: self.version,
    }))
  }
}

#[test]
fn test_cache_loader_implementation_is_used() {
  let store = Arc::new(MemoryStore::new());
  let calls = Arc::new(AtomicUsize::new(0));
  let loader = VersionedLoader {
    version: 42,
    calls: calls.clone(),
  };

  let cache = builder("trait-loader", store.clone())
    .recheck_delay(Duration::from_millis(200))
    .recheck_jitter(Duration::ZERO)
    .cache_loader(loader)
    .build()
    .unwrap();

  assert_eq!(cache.get("user:7").map(|p| p.version), Some(42));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(read_back(&store, "user:7").unwrap().0.version, 42);
}

#[test]
fn test_builder_accepts_config_section() {
  let config = LoadingCacheConfig {
    name: "from-config".to_string(),
    ttl_secs: 30,
    refresh_before_expired_secs: 5,
    direct_loading_threshold: 7,
    refresh_workers: 2,
    ..LoadingCacheConfig::default()
  };

  let cache: LoadingCache<Profile> = LoadingCacheBuilder::new()
    .config(config)
    .store(MemoryStore::new())
    .json()
    .loader(noop_loader)
    .build()
    .unwrap();

  assert_eq!(cache.name(), "from-config");
  let debug = format!("{cache:?}");
  assert!(debug.contains("ttl_secs: 30"), "{debug}");
  assert!(debug.contains("refresh_before_expired_secs: 5"), "{debug}");
}

#[test]
fn test_background_loads_run_on_named_workers() {
  let thread_names = Arc::new(Mutex::new(Vec::new()));
  let names = thread_names.clone();
  let store = Arc::new(MemoryStore::new());

  let cache = builder("named", store)
    .recheck_delay(Duration::from_millis(200))
    .recheck_jitter(Duration::ZERO)
    .loader(move |key: &str| {
      names
        .lock()
        .push(thread::current().name().map(str::to_string));
      Ok(Some(Profile {
        key: key.to_string(),
        version: 1,
      }))
    })
    .build()
    .unwrap();

  assert!(cache.get("user:1").is_some());

  let names = thread_names.lock();
  assert_eq!(names.len(), 1, "only the background worker should have loaded");
  let name = names[0].as_deref().unwrap_or_default();
  assert!(name.starts_with("async-refresh-cache-named-"), "thread name {name}");
}

#[test]
fn test_shutdown_rejects_refreshes_but_keeps_serving() {
  let store = Arc::new(MemoryStore::new());
  let calls = Arc::new(AtomicUsize::new(0));
  let cache = builder("stopped", store.clone())
    .recheck_delay(Duration::from_millis(5))
    .recheck_jitter(Duration::ZERO)
    .loader(counting_loader(calls.clone(), Duration::ZERO))
    .build()
    .unwrap();

  cache.shutdown();
  // A second call is a no-op.
  cache.shutdown();

  let value = cache.get("user:3").expect("direct load after shutdown");
  assert_eq!(value.version, 1);

  let metrics = cache.metrics();
  assert_eq!(metrics.refreshes_scheduled, 0);
  assert_eq!(metrics.refreshes_rejected, 1);
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(read_back(&store, "user:3").unwrap().0.version, 1);
}

#[test]
fn test_dropping_cache_drains_queued_refreshes() {
  let store = Arc::new(MemoryStore::new());
  seed(
    &store,
    "user:4",
    &Profile {
      key: "user:4".to_string(),
      version: 0,
    },
    2,
  );

  let calls = Arc::new(AtomicUsize::new(0));
  let cache = build_test_cache(
    "drain",
    store.clone(),
    calls.clone(),
    Duration::from_millis(100),
  );

  assert!(cache.get("user:4").is_some());
  assert_eq!(cache.metrics().refreshes_scheduled, 1);
  drop(cache);

  // The refresh was given the shutdown grace period to finish.
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(read_back(&store, "user:4").unwrap().0.version, 1);
}

#[test]
fn test_clones_share_state() {
  let store = Arc::new(MemoryStore::new());
  seed(
    &store,
    "user:5",
    &Profile {
      key: "user:5".to_string(),
      version: 0,
    },
    60,
  );

  let calls = Arc::new(AtomicUsize::new(0));
  let cache = build_test_cache("clones", store, calls, Duration::ZERO);
  let other = cache.clone();

  assert!(cache.get("user:5").is_some());
  assert!(other.get("user:5").is_some());

  assert_eq!(cache.metrics().hits, 2);
  assert_eq!(other.metrics().hits, 2);
  assert_eq!(other.name(), "clones");
}
