use fibre_loading_cache::{LoadingCacheBuilder, MemoryStore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Report {
  version: usize,
  rows: Vec<u32>,
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_thread_names(true)
    .init();

  let load_counter = Arc::new(AtomicUsize::new(0));
  let store = Arc::new(MemoryStore::new());

  let cache = LoadingCacheBuilder::new()
    .name("reports")
    .time_to_live(Duration::from_secs(4))
    .refresh_before_expired(Duration::from_secs(2))
    .loading_threshold(10)
    .store(store.clone())
    .json()
    .loader({
      let counter = load_counter.clone();
      move |key: &str| {
        let version = counter.fetch_add(1, Ordering::SeqCst) + 1;
        println!("[Loader] Building version {} of '{}'...", version, key);
        thread::sleep(Duration::from_millis(150)); // Simulate an expensive query
        Ok(Some(Report {
          version,
          rows: (0..8).collect(),
        }))
      }
    })
    .build()
    .unwrap();

  println!("--- Step 1: 64 threads ask for the same cold key ---");
  let barrier = Arc::new(Barrier::new(64));
  let handles: Vec<_> = (0..64)
    .map(|_| {
      let cache = cache.clone();
      let barrier = barrier.clone();
      thread::spawn(move || {
        barrier.wait();
        cache.get("daily-report")
      })
    })
    .collect();
  let served = handles
    .into_iter()
    .filter_map(|h| h.join().unwrap())
    .count();
  println!("Served: {served}/64, loader calls: {}", load_counter.load(Ordering::SeqCst));

  println!("\n--- Step 2: Wait until the entry is close to expiry ---");
  thread::sleep(Duration::from_millis(2_500));
  let value = cache.get("daily-report");
  println!("Received (stale-ish): {:?}", value.map(|r| r.version));
  thread::sleep(Duration::from_millis(300));
  println!("After background refresh: {:?}", cache.get("daily-report").map(|r| r.version));

  println!("\n--- Step 3: The store goes offline ---");
  store.set_available(false);
  for i in 0..20 {
    let got = cache.get(&format!("report:{i}")).is_some();
    println!("report:{i} -> {}", if got { "loaded directly" } else { "shed" });
  }
  store.set_available(true);

  println!("\n{:#?}", cache.metrics());
  cache.shutdown();
}
