use crate::store::hash_key;

use core::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};

/// One striping slot. The mutex guards the decision to submit a refresh.
/// The list it protects holds the key hashes of refreshes still in flight,
/// and is only used when in-flight tracking is enabled.
type Slot = CachePadded<Mutex<Vec<u64>>>;

/// Decides which caller gets to schedule the background refresh of a key.
///
/// Keys are hashed onto a fixed number of slots, so memory stays bounded no
/// matter how many keys are seen. A slot is held only while its holder
/// submits a refresh: co-located keys racing for it in that moment have their
/// refresh suppressed, and a caller arriving after submission may schedule a
/// redundant one. Reads are never affected.
///
/// With in-flight tracking enabled, a key whose refresh is submitted but not
/// finished is not scheduled again. Other keys of the same slot are not
/// affected by it.
pub(crate) struct RefreshGuard<H> {
  slots: Arc<[Slot]>,
  hasher: H,
  track_in_flight: bool,
}

impl<H> fmt::Debug for RefreshGuard<H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RefreshGuard")
      .field("num_slots", &self.slots.len())
      .field("track_in_flight", &self.track_in_flight)
      .finish()
  }
}

impl<H: BuildHasher> RefreshGuard<H> {
  /// Creates a guard with `num_slots` stripes. `num_slots` must be non-zero.
  pub(crate) fn new(num_slots: usize, hasher: H, track_in_flight: bool) -> Self {
    let slots: Vec<Slot> = (0..num_slots)
      .map(|_| CachePadded::new(Mutex::new(Vec::new())))
      .collect();
    Self {
      slots: slots.into(),
      hasher,
      track_in_flight,
    }
  }

  #[inline]
  pub(crate) fn slot_index(&self, key: &str) -> usize {
    hash_key(&self.hasher, key) as usize % self.slots.len()
  }

  /// Tries to become the refresher for `key` without blocking.
  ///
  /// Returns `None` if the slot is contended right now, or, with in-flight
  /// tracking, if a refresh of this key has not finished yet.
  ///
  /// Without tracking the claim keeps the slot locked until it is dropped,
  /// which the caller does right after submitting. With tracking the slot
  /// is unlocked before this returns and the key stays marked until the
  /// claim's [`InFlight`] marker is dropped.
  pub(crate) fn try_claim(&self, key: &str) -> Option<SlotClaim<'_>> {
    let hash = hash_key(&self.hasher, key);
    let index = hash as usize % self.slots.len();
    let mut in_flight = self.slots[index].try_lock()?;

    if !self.track_in_flight {
      return Some(SlotClaim {
        _decision: Some(in_flight),
        in_flight: None,
      });
    }

    if in_flight.contains(&hash) {
      return None;
    }
    in_flight.push(hash);

    Some(SlotClaim {
      _decision: None,
      in_flight: Some(InFlight {
        slots: Arc::clone(&self.slots),
        index,
        hash,
      }),
    })
  }
}

/// The right to submit one refresh.
pub(crate) struct SlotClaim<'a> {
  _decision: Option<MutexGuard<'a, Vec<u64>>>,
  in_flight: Option<InFlight>,
}

impl SlotClaim<'_> {
  /// Takes the in-flight marker, to be moved into the refresh job.
  pub(crate) fn take_in_flight(&mut self) -> Option<InFlight> {
    self.in_flight.take()
  }
}

impl fmt::Debug for SlotClaim<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SlotClaim")
      .field("holds_slot", &self._decision.is_some())
      .field("in_flight", &self.in_flight)
      .finish()
  }
}

/// Marks a key's refresh as in flight. Dropping it makes the key eligible again.
pub(crate) struct InFlight {
  slots: Arc<[Slot]>,
  index: usize,
  hash: u64,
}

impl fmt::Debug for InFlight {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InFlight").field("index", &self.index).finish()
  }
}

impl Drop for InFlight {
  fn drop(&mut self) {
    let mut in_flight = self.slots[self.index].lock();
    if let Some(pos) = in_flight.iter().position(|h| *h == self.hash) {
      in_flight.swap_remove(pos);
    }
  }
}
