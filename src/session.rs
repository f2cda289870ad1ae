//! Entry point tying an identity, collaborators and a store together.
//!
//! A `Session` is what a UI layer holds: ask it for a child's news on every
//! render and it hands back the current snapshot, starting a fetch sequence
//! the first time a key is requested.

use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::api::{Child, FakeSource, HttpSource, Identity, RemoteSource};
use crate::cache::{NoopCache, PersistentCache, ResourceKey, ResourceKind, SqliteCache};
use crate::config::Config;
use crate::fetch::{FetchCoordinator, RetryPolicy};
use crate::report::{Reporter, TracingReporter};
use crate::store::{Action, ClearScope, KeyedStore, LoadState};

pub struct Session {
  source: Arc<dyn RemoteSource>,
  coordinator: FetchCoordinator,
}

impl Session {
  pub fn new(
    source: Arc<dyn RemoteSource>,
    cache: Arc<dyn PersistentCache>,
    reporter: Arc<dyn Reporter>,
    policy: RetryPolicy,
  ) -> Self {
    let store = Arc::new(KeyedStore::new(policy.max_retries));
    let coordinator = FetchCoordinator::new(store, Arc::clone(&source), cache, reporter)
      .with_retry_delay(policy.delay);

    Self {
      source,
      coordinator,
    }
  }

  /// Build a session from configuration: HTTP or simulated source, SQLite or
  /// no-op cache, tracing reporter.
  pub fn from_config(config: &Config) -> Result<Self> {
    let source: Arc<dyn RemoteSource> = if config.api.fake {
      Arc::new(FakeSource::new(config.subject_id.clone()))
    } else {
      Arc::new(HttpSource::new(config)?)
    };

    let cache: Arc<dyn PersistentCache> = if config.cache.enabled {
      Arc::new(SqliteCache::open(config.cache.path.as_deref())?)
    } else {
      Arc::new(NoopCache)
    };

    info!(
      fake = config.api.fake,
      cache = config.cache.enabled,
      logged_in = source.is_logged_in(),
      "session ready"
    );

    Ok(Self::new(
      source,
      cache,
      Arc::new(TracingReporter),
      config.fetch.retry_policy(),
    ))
  }

  /// Identity as the source reports it right now.
  pub fn identity(&self) -> Identity {
    Identity::from_source(self.source.as_ref())
  }

  pub fn store(&self) -> &Arc<KeyedStore> {
    self.coordinator.store()
  }

  pub fn key(&self, kind: ResourceKind, child: &Child) -> ResourceKey {
    ResourceKey::new(self.source.subject_id(), kind, child.id.clone())
  }

  /// Current state of `kind` for `child`, starting a fetch if none has run.
  pub fn resource(&self, kind: ResourceKind, child: &Child) -> LoadState {
    let key = self.key(kind, child);
    self.coordinator.ensure_fresh(&key, &self.identity());
    self.store().select(&key)
  }

  pub fn news(&self, child: &Child) -> LoadState {
    self.resource(ResourceKind::News, child)
  }

  /// Observe `kind` for `child`, starting a fetch if none has run.
  ///
  /// The first message is the state at the time of subscribing.
  pub fn subscribe(&self, kind: ResourceKind, child: &Child) -> mpsc::UnboundedReceiver<LoadState> {
    let key = self.key(kind, child);
    let rx = self.store().subscribe(&key);
    self.coordinator.ensure_fresh(&key, &self.identity());
    rx
  }

  pub fn subscribe_news(&self, child: &Child) -> mpsc::UnboundedReceiver<LoadState> {
    self.subscribe(ResourceKind::News, child)
  }

  /// Revalidate a settled key. No-op while a fetch for it is still running.
  pub fn reload(&self, kind: ResourceKind, child: &Child) -> Option<JoinHandle<()>> {
    let key = self.key(kind, child);
    self.coordinator.refresh(&key, &self.identity())
  }

  pub fn reload_news(&self, child: &Child) -> Option<JoinHandle<()>> {
    self.reload(ResourceKind::News, child)
  }

  /// Reset every key to pending and allow settled keys to fetch again.
  ///
  /// Sequences still in flight run to completion and land their result.
  pub fn clear(&self) {
    self.store().dispatch(Action::Clear(ClearScope::All));
    let forgotten = self.coordinator.gate().forget_settled();
    info!(forgotten, "session cleared");
  }
}
