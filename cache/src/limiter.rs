use core::fmt;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Token accounting of the limiter, protected by a `Mutex`.
struct LimiterState {
  /// Permits saved up while the limiter was idle.
  stored_permits: f64,
  /// The earliest instant at which the next permit can be handed out.
  next_free: Instant,
}

/// A smooth token-bucket limiter bounding how often the loader may be called
/// directly, across all keys.
///
/// Permits are issued at a steady `permits_per_second`. Up to one second worth
/// of permits is saved while idle. A caller may reserve a permit that only
/// becomes available in the future, as long as that is within its timeout;
/// it then sleeps until the reserved instant.
pub(crate) struct AdmissionLimiter {
  state: Mutex<LimiterState>,
  interval: Duration,
  max_permits: f64,
  permits_per_second: u32,
}

impl fmt::Debug for AdmissionLimiter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("AdmissionLimiter")
      .field("permits_per_second", &self.permits_per_second)
      .field("stored_permits", &state.stored_permits)
      .finish()
  }
}

impl AdmissionLimiter {
  /// Creates a limiter issuing `permits_per_second` permits. Must be non-zero.
  pub(crate) fn new(permits_per_second: u32) -> Self {
    Self {
      state: Mutex::new(LimiterState {
        stored_permits: 0.0,
        next_free: Instant::now(),
      }),
      interval: Duration::from_secs(1) / permits_per_second,
      max_permits: f64::from(permits_per_second),
      permits_per_second,
    }
  }

  pub(crate) fn permits_per_second(&self) -> u32 {
    self.permits_per_second
  }

  /// Acquires one permit, waiting at most `timeout` for it.
  ///
  /// Returns `false` without waiting if the permit cannot be available within
  /// `timeout`.
  pub(crate) fn try_acquire(&self, timeout: Duration) -> bool {
    let now = Instant::now();
    let wait = {
      let mut state = self.state.lock();
      self.resync(&mut state, now);

      if state.next_free > now + timeout {
        return false;
      }

      let moment = state.next_free;
      let from_stored = state.stored_permits.min(1.0);
      let fresh = 1.0 - from_stored;
      state.stored_permits -= from_stored;
      state.next_free += self.interval.mul_f64(fresh);

      moment.saturating_duration_since(now)
    };

    if !wait.is_zero() {
      thread::sleep(wait);
    }
    true
  }

  /// Credits the permits accumulated since `next_free` if it is in the past.
  fn resync(&self, state: &mut LimiterState, now: Instant) {
    if now > state.next_free {
      let idle = now - state.next_free;
      let earned = idle.as_secs_f64() / self.interval.as_secs_f64();
      state.stored_permits = (state.stored_permits + earned).min(self.max_permits);
      state.next_free = now;
    }
  }
}
