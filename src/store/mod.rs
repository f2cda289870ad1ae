//! Keyed store of load states.
//!
//! The store is the only shared mutable state in the crate. It is changed
//! exclusively through [`KeyedStore::dispatch`], read through
//! [`KeyedStore::select`] and observed through [`KeyedStore::subscribe`].
//! Actions are applied one at a time under a lock, and subscribers are
//! notified before the lock is released, so every observer sees a key's
//! transitions in the same order.

mod state;

pub use state::{Failure, Item, LoadState, Status};

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::ResourceKey;

/// Default number of failed attempts before a key settles in `Status::Error`.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A state change request.
#[derive(Debug, Clone)]
pub enum Action {
  /// A fetch sequence started, optionally with data read from the persistent cache
  Loading {
    key: ResourceKey,
    cached: Option<Vec<Item>>,
  },
  /// A live fetch returned fresh data
  Loaded { key: ResourceKey, data: Vec<Item> },
  /// Attempt number `attempt` (1-based) of the running sequence failed
  Failed {
    key: ResourceKey,
    error: Failure,
    attempt: u32,
  },
  /// Reset one key, or every key, back to `Status::Pending`
  Clear(ClearScope),
}

/// Which keys a `Action::Clear` resets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
  Key(ResourceKey),
  All,
}

#[derive(Default)]
struct Entry {
  state: LoadState,
  listeners: Vec<mpsc::UnboundedSender<LoadState>>,
}

impl Entry {
  fn apply(&mut self, state: LoadState) -> LoadState {
    self.state = state;
    // Drop listeners whose receiver is gone
    let snapshot = &self.state;
    self
      .listeners
      .retain(|tx| tx.send(snapshot.clone()).is_ok());
    self.state.clone()
  }
}

/// Store of `LoadState` records, ordered by `ResourceKey`.
pub struct KeyedStore {
  entries: Mutex<BTreeMap<ResourceKey, Entry>>,
  max_retries: u32,
}

impl Default for KeyedStore {
  fn default() -> Self {
    Self::new(DEFAULT_MAX_RETRIES)
  }
}

impl KeyedStore {
  /// Create an empty store. A key settles in `Status::Error` after
  /// `max_retries` failed attempts (at least one).
  pub fn new(max_retries: u32) -> Self {
    Self {
      entries: Mutex::new(BTreeMap::new()),
      max_retries: max_retries.max(1),
    }
  }

  pub fn max_retries(&self) -> u32 {
    self.max_retries
  }

  /// Apply an action and notify the affected key's subscribers.
  ///
  /// Returns the key's new state, or `None` for `ClearScope::All`.
  pub fn dispatch(&self, action: Action) -> Option<LoadState> {
    let mut entries = self.lock("dispatch");

    match action {
      Action::Loading { key, cached } => {
        debug!(key = %key, from_cache = cached.is_some(), "loading");
        let entry = entries.entry(key).or_default();
        let next = entry.state.to_loading(cached);
        Some(entry.apply(next))
      }
      Action::Loaded { key, data } => {
        debug!(key = %key, items = data.len(), "loaded");
        let entry = entries.entry(key).or_default();
        Some(entry.apply(LoadState::loaded(data)))
      }
      Action::Failed {
        key,
        error,
        attempt,
      } => {
        let entry = entries.entry(key.clone()).or_default();
        let next = entry.state.to_failed(error, attempt, self.max_retries);
        debug!(
          key = %key,
          retry_count = next.retry_count,
          status = ?next.status,
          "fetch attempt failed"
        );
        Some(entry.apply(next))
      }
      Action::Clear(ClearScope::Key(key)) => {
        debug!(key = %key, "clearing key");
        match entries.get_mut(&key) {
          Some(entry) => Some(entry.apply(LoadState::pending())),
          None => Some(LoadState::pending()),
        }
      }
      Action::Clear(ClearScope::All) => {
        debug!(keys = entries.len(), "clearing all keys");
        for entry in entries.values_mut() {
          entry.apply(LoadState::pending());
        }
        None
      }
    }
  }

  /// Current state of `key`. Keys never dispatched to read as pending.
  pub fn select(&self, key: &ResourceKey) -> LoadState {
    self
      .lock("select")
      .get(key)
      .map(|entry| entry.state.clone())
      .unwrap_or_default()
  }

  /// Observe every state `key` moves through.
  ///
  /// The receiver gets the current state first, then one message per
  /// dispatched action touching the key, in dispatch order.
  pub fn subscribe(&self, key: &ResourceKey) -> mpsc::UnboundedReceiver<LoadState> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut entries = self.lock("subscribe");
    let entry = entries.entry(key.clone()).or_default();
    // The receiver is alive, this cannot fail
    let _ = tx.send(entry.state.clone());
    entry.listeners.push(tx);
    rx
  }

  /// Keys that have been requested or dispatched to, in key order.
  pub fn keys(&self) -> Vec<ResourceKey> {
    self.lock("keys").keys().cloned().collect()
  }

  fn lock(&self, op: &'static str) -> MutexGuard<'_, BTreeMap<ResourceKey, Entry>> {
    match self.entries.lock() {
      Ok(guard) => guard,
      Err(poisoned) => {
        warn!(
          op,
          result = "poisoned_recovered",
          "Recovered from poisoned store lock"
        );
        poisoned.into_inner()
      }
    }
  }
}
