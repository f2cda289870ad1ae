//! Stale-while-revalidate fetch coordination.
//!
//! For a given key the coordinator runs one sequence:
//!
//! 1. Read the persistent cache and publish any hit as `Loading` data
//! 2. Fetch from the remote source
//! 3. On success publish `Loaded` and persist, unless the session is simulated
//! 4. On failure report it, keep the stale data and retry; after
//!    `max_retries` attempts the key settles in `Error`
//!
//! Sequences are spawned on the tokio runtime and deduplicated per key by a
//! [`DedupGate`]. Cache I/O runs on the blocking pool.

mod gate;

#[cfg(test)]
mod tests;

pub use gate::{DedupGate, Marker};

use chrono::Utc;
use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::api::{Identity, RemoteSource};
use crate::cache::{PersistentCache, ResourceKey};
use crate::report::Reporter;
use crate::store::{Action, Item, KeyedStore, DEFAULT_MAX_RETRIES};

/// How failed attempts are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Failed attempts before a key settles in `Status::Error`
  pub max_retries: u32,
  /// Pause between a failed attempt and the next one
  pub delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: DEFAULT_MAX_RETRIES,
      delay: Duration::ZERO,
    }
  }
}

/// Drives fetch sequences for keys and lands their results in a [`KeyedStore`].
///
/// Cheap to clone; clones share the store, gate and collaborators.
#[derive(Clone)]
pub struct FetchCoordinator {
  store: Arc<KeyedStore>,
  gate: Arc<DedupGate>,
  source: Arc<dyn RemoteSource>,
  cache: Arc<dyn PersistentCache>,
  reporter: Arc<dyn Reporter>,
  retry_delay: Duration,
}

impl FetchCoordinator {
  pub fn new(
    store: Arc<KeyedStore>,
    source: Arc<dyn RemoteSource>,
    cache: Arc<dyn PersistentCache>,
    reporter: Arc<dyn Reporter>,
  ) -> Self {
    Self {
      store,
      gate: Arc::new(DedupGate::new()),
      source,
      cache,
      reporter,
      retry_delay: Duration::ZERO,
    }
  }

  /// Set the pause between failed attempts.
  pub fn with_retry_delay(mut self, delay: Duration) -> Self {
    self.retry_delay = delay;
    self
  }

  pub fn gate(&self) -> &DedupGate {
    &self.gate
  }

  pub fn store(&self) -> &Arc<KeyedStore> {
    &self.store
  }

  /// Make sure a fetch sequence has run (or is running) for `key`.
  ///
  /// Idempotent: only the first call per cycle starts a sequence, later calls
  /// are no-ops until the key is forgotten. Unauthenticated identities never
  /// fetch. Returns the spawned sequence when this call started one.
  ///
  /// Must be called from within a tokio runtime.
  pub fn ensure_fresh(&self, key: &ResourceKey, identity: &Identity) -> Option<JoinHandle<()>> {
    if !identity.is_authenticated() {
      trace!(key = %key, "not logged in, skipping fetch");
      return None;
    }

    if !self.gate.try_acquire(key) {
      trace!(key = %key, "fetch already registered");
      return None;
    }

    let this = self.clone();
    let key = key.clone();
    Some(tokio::spawn(async move { this.run(key).await }))
  }

  /// Start a new cycle for a settled key.
  ///
  /// A sequence still in flight is left alone and `None` is returned.
  pub fn refresh(&self, key: &ResourceKey, identity: &Identity) -> Option<JoinHandle<()>> {
    if !self.gate.forget(key) {
      trace!(key = %key, "refresh requested while in flight");
      return None;
    }
    self.ensure_fresh(key, identity)
  }

  async fn run(self, key: ResourceKey) {
    let cache_key = key.cache_key();

    let cached = self.read_cache(&cache_key).await;
    self.store.dispatch(Action::Loading {
      key: key.clone(),
      cached,
    });

    let message = format!("Error getting {} from API", key.kind().label());
    let max_retries = self.store.max_retries();
    let mut attempt = 0;
    loop {
      attempt += 1;
      match self.source.fetch(key.kind(), key.parent_id()).await {
        Ok(data) => {
          if self.source.is_fake() {
            debug!(key = %key, "simulated session, leaving cache untouched");
          } else {
            self.write_cache(&cache_key, &data).await;
          }
          self.store.dispatch(Action::Loaded {
            key: key.clone(),
            data,
          });
          break;
        }
        Err(err) => {
          let failure = Arc::new(err);
          self.store.dispatch(Action::Failed {
            key: key.clone(),
            error: Arc::clone(&failure),
            attempt,
          });
          self.reporter.error(&failure, &message);

          if attempt >= max_retries {
            warn!(key = %key, attempt, error = %failure, "giving up after repeated failures");
            break;
          }

          if !self.retry_delay.is_zero() {
            tokio::time::sleep(self.retry_delay).await;
          }
        }
      }
    }

    self.gate.release(&key);
  }

  /// Cached collection under `cache_key`. Read and decode failures count as a miss.
  async fn read_cache(&self, cache_key: &str) -> Option<Vec<Item>> {
    let cache = Arc::clone(&self.cache);
    let lookup_key = cache_key.to_string();
    let lookup = tokio::task::spawn_blocking(move || -> Result<_> {
      let raw = cache.get(&lookup_key)?;
      let cached_at = match raw {
        Some(_) => cache.cached_at(&lookup_key).ok().flatten(),
        None => None,
      };
      Ok((raw, cached_at))
    })
    .await;

    let (raw, cached_at) = match lookup {
      Ok(Ok((Some(raw), cached_at))) => (raw, cached_at),
      Ok(Ok((None, _))) => {
        debug!(cache_key, "cache miss");
        return None;
      }
      Ok(Err(err)) => {
        warn!(cache_key, error = %err, "cache read failed, treating as miss");
        return None;
      }
      Err(err) => {
        warn!(cache_key, error = %err, "cache read task failed, treating as miss");
        return None;
      }
    };

    match serde_json::from_str::<Vec<Item>>(&raw) {
      Ok(items) => {
        match cached_at {
          Some(cached_at) => {
            let age = Utc::now() - cached_at;
            debug!(cache_key, age_secs = age.num_seconds(), "cache hit");
          }
          None => debug!(cache_key, "cache hit"),
        }
        Some(items)
      }
      Err(err) => {
        warn!(cache_key, error = %err, "cached value is not a JSON array, ignoring");
        None
      }
    }
  }

  async fn write_cache(&self, cache_key: &str, data: &[Item]) {
    let serialized = match serde_json::to_string(data) {
      Ok(serialized) => serialized,
      Err(err) => {
        warn!(cache_key, error = %err, "failed to serialize fetched data");
        return;
      }
    };

    let cache = Arc::clone(&self.cache);
    let store_key = cache_key.to_string();
    let written = tokio::task::spawn_blocking(move || cache.set(&store_key, &serialized)).await;

    match written {
      Ok(Ok(())) => {}
      Ok(Err(err)) => warn!(cache_key, error = %err, "cache write failed"),
      Err(err) => warn!(cache_key, error = %err, "cache write task failed"),
    }
  }
}
