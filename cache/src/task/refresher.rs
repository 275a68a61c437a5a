use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use fibre::error::TrySendError;
use fibre::mpmc;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

/// A type-erased unit of background work.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why a job was not accepted by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitError {
  /// The queue is at capacity.
  Full,
  /// The pool is shutting down.
  Closed,
}

/// Counts running workers so shutdown can wait for them with a deadline.
#[derive(Default)]
struct Liveness {
  running: Mutex<usize>,
  exited: Condvar,
}

/// A fixed set of threads dedicated to background refreshes.
///
/// Jobs travel through a bounded MPMC channel; every worker owns a receiver
/// clone. Submitting never blocks: a full queue rejects the job instead.
/// The pool holds the only sender, so taking it out disconnects the channel
/// and lets the workers exit once the queue is drained.
pub(crate) struct RefreshPool {
  name: String,
  sender: Mutex<Option<mpmc::Sender<Job>>>,
  workers: Mutex<Vec<JoinHandle<()>>>,
  liveness: Arc<Liveness>,
  abandon: Arc<AtomicBool>,
  shut_down: AtomicBool,
}

impl RefreshPool {
  /// Spawns `num_workers` threads named `async-refresh-cache-{name}-{n}`.
  pub(crate) fn spawn(name: &str, num_workers: usize, queue_capacity: usize) -> std::io::Result<Self> {
    let (tx, rx): (mpmc::Sender<Job>, mpmc::Receiver<Job>) = mpmc::bounded(queue_capacity);
    let liveness = Arc::new(Liveness::default());
    let abandon = Arc::new(AtomicBool::new(false));

    let mut workers = Vec::with_capacity(num_workers);
    for n in 0..num_workers {
      let rx = rx.clone();
      let worker_liveness = liveness.clone();
      let abandon = abandon.clone();
      *liveness.running.lock() += 1;

      let spawned = thread::Builder::new()
        .name(format!("async-refresh-cache-{name}-{n}"))
        .spawn(move || {
          Self::run_worker(rx, &abandon);
          let mut running = worker_liveness.running.lock();
          *running -= 1;
          worker_liveness.exited.notify_all();
        });

      match spawned {
        Ok(handle) => workers.push(handle),
        Err(e) => {
          *liveness.running.lock() -= 1;
          // Already spawned workers exit once `tx` is dropped.
          return Err(e);
        }
      }
    }

    Ok(Self {
      name: name.to_string(),
      sender: Mutex::new(Some(tx)),
      workers: Mutex::new(workers),
      liveness,
      abandon,
      shut_down: AtomicBool::new(false),
    })
  }

  fn run_worker(rx: mpmc::Receiver<Job>, abandon: &AtomicBool) {
    // The loop ends once the channel is closed and drained.
    while let Ok(job) = rx.recv() {
      if abandon.load(Ordering::Acquire) {
        drop(job);
        continue;
      }
      if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!("background refresh job panicked");
      }
    }
  }

  /// Queues a job without blocking.
  pub(crate) fn try_submit(&self, job: Job) -> Result<(), SubmitError> {
    let sender = self.sender.lock();
    let Some(sender) = sender.as_ref() else {
      return Err(SubmitError::Closed);
    };
    match sender.try_send(job) {
      Ok(()) => Ok(()),
      Err(TrySendError::Full(_)) => Err(SubmitError::Full),
      Err(_) => Err(SubmitError::Closed),
    }
  }

  /// Stops accepting jobs and waits up to `grace` for queued ones to finish.
  ///
  /// Workers still busy after the grace period are detached and drop the rest
  /// of the queue without running it. Calling this more than once is a no-op.
  pub(crate) fn shutdown(&self, grace: Duration) {
    if self.shut_down.swap(true, Ordering::AcqRel) {
      return;
    }

    drop(self.sender.lock().take());

    let deadline = Instant::now() + grace;
    let mut running = self.liveness.running.lock();
    while *running > 0 {
      if self.liveness.exited.wait_until(&mut running, deadline).timed_out() {
        break;
      }
    }
    let still_running = *running;
    drop(running);

    let handles = std::mem::take(&mut *self.workers.lock());
    if still_running == 0 {
      for handle in handles {
        let _ = handle.join();
      }
      debug!(cache = %self.name, "refresh pool drained");
    } else {
      self.abandon.store(true, Ordering::Release);
      warn!(
        cache = %self.name,
        workers = still_running,
        "refresh workers did not finish within {:?}, abandoning queued refreshes",
        grace
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  #[test]
  fn runs_submitted_jobs_on_named_workers() {
    let pool = RefreshPool::spawn("unit", 2, 16).unwrap();
    let names = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..4 {
      let names = names.clone();
      pool
        .try_submit(Box::new(move || {
          let name = thread::current().name().unwrap_or_default().to_string();
          names.lock().push(name);
        }))
        .unwrap();
    }
    pool.shutdown(Duration::from_secs(5));

    let names = names.lock();
    assert_eq!(names.len(), 4);
    assert!(names.iter().all(|n| n.starts_with("async-refresh-cache-unit-")));
  }

  #[test]
  fn full_queue_rejects_without_blocking() {
    let pool = RefreshPool::spawn("full", 1, 1).unwrap();
    let release = Arc::new(AtomicBool::new(false));

    // Occupy the only worker, then fill the single queue slot.
    let started = Arc::new(AtomicBool::new(false));
    {
      let release = release.clone();
      let started = started.clone();
      pool
        .try_submit(Box::new(move || {
          started.store(true, Ordering::SeqCst);
          while !release.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
          }
        }))
        .unwrap();
    }
    while !started.load(Ordering::SeqCst) {
      thread::sleep(Duration::from_millis(1));
    }
    pool.try_submit(Box::new(|| {})).unwrap();

    assert_eq!(pool.try_submit(Box::new(|| {})), Err(SubmitError::Full));

    release.store(true, Ordering::SeqCst);
    pool.shutdown(Duration::from_secs(5));
    assert_eq!(pool.try_submit(Box::new(|| {})), Err(SubmitError::Closed));
  }

  #[test]
  fn panicking_job_does_not_kill_the_worker() {
    let pool = RefreshPool::spawn("panic", 1, 8).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    pool.try_submit(Box::new(|| panic!("boom"))).unwrap();
    {
      let ran = ran.clone();
      pool
        .try_submit(Box::new(move || {
          ran.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }
    pool.shutdown(Duration::from_secs(5));

    assert_eq!(ran.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn shutdown_abandons_queue_after_grace() {
    let pool = RefreshPool::spawn("slow", 1, 8).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
      let ran = ran.clone();
      pool
        .try_submit(Box::new(move || {
          thread::sleep(Duration::from_millis(200));
          ran.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }

    let start = Instant::now();
    pool.shutdown(Duration::from_millis(50));
    assert!(start.elapsed() < Duration::from_millis(190));

    thread::sleep(Duration::from_millis(500));
    assert_eq!(ran.load(Ordering::SeqCst), 1, "queued jobs must be dropped");
  }
}
