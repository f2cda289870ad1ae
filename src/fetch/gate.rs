//! Deduplication of fetch sequences by key.

use std::collections::hash_map::{Entry, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::cache::ResourceKey;

/// Lifecycle of a key's fetch sequence within the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
  /// A sequence is running; nobody else may start one
  InFlight,
  /// A sequence ran to completion; repeat requests are no-ops until forgotten
  Settled,
}

/// Guard admitting at most one fetch sequence per key.
///
/// All operations are synchronous checks against a marker map, so any number
/// of callers within the same scheduling tick see a consistent answer.
#[derive(Debug, Default)]
pub struct DedupGate {
  markers: Mutex<HashMap<ResourceKey, Marker>>,
}

impl DedupGate {
  pub fn new() -> Self {
    Self::default()
  }

  /// Claim `key`. Returns true when the caller is now the sole owner and must
  /// call [`DedupGate::release`] once its sequence settles.
  pub fn try_acquire(&self, key: &ResourceKey) -> bool {
    match self.lock().entry(key.clone()) {
      Entry::Occupied(_) => false,
      Entry::Vacant(slot) => {
        slot.insert(Marker::InFlight);
        true
      }
    }
  }

  /// Mark the owner's sequence as settled. The key stays claimed.
  pub fn release(&self, key: &ResourceKey) {
    if let Some(marker) = self.lock().get_mut(key) {
      *marker = Marker::Settled;
    }
  }

  pub fn marker(&self, key: &ResourceKey) -> Option<Marker> {
    self.lock().get(key).copied()
  }

  /// Drop a settled marker so the next request starts a new sequence.
  ///
  /// Returns false if a sequence for `key` is still in flight.
  pub fn forget(&self, key: &ResourceKey) -> bool {
    let mut markers = self.lock();
    match markers.get(key).copied() {
      Some(Marker::InFlight) => false,
      Some(Marker::Settled) => {
        markers.remove(key);
        true
      }
      None => true,
    }
  }

  /// Drop every settled marker. In-flight markers survive.
  pub fn forget_settled(&self) -> usize {
    let mut markers = self.lock();
    let before = markers.len();
    markers.retain(|_, marker| *marker == Marker::InFlight);
    before - markers.len()
  }

  pub fn in_flight(&self) -> usize {
    self
      .lock()
      .values()
      .filter(|marker| **marker == Marker::InFlight)
      .count()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<ResourceKey, Marker>> {
    match self.markers.lock() {
      Ok(guard) => guard,
      Err(poisoned) => {
        warn!(result = "poisoned_recovered", "Recovered from poisoned gate lock");
        poisoned.into_inner()
      }
    }
  }
}
