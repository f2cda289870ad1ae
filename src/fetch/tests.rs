use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use color_eyre::{eyre::eyre, Report, Result};
use futures::future::{BoxFuture, FutureExt};
use serde_json::json;
use tokio::sync::{mpsc, Notify};

use super::*;
use crate::cache::{MemoryCache, ResourceKind};
use crate::store::{Action, ClearScope, LoadState, Status};

/// Remote source whose answers are scripted by the test.
struct ScriptedSource {
  logged_in: AtomicBool,
  fake: AtomicBool,
  calls: AtomicUsize,
  failures: Mutex<VecDeque<String>>,
  response: Vec<Item>,
  hold: Option<Arc<Notify>>,
}

impl ScriptedSource {
  fn new(response: Vec<Item>) -> Self {
    Self {
      logged_in: AtomicBool::new(true),
      fake: AtomicBool::new(false),
      calls: AtomicUsize::new(0),
      failures: Mutex::new(VecDeque::new()),
      response,
      hold: None,
    }
  }

  /// Fail the next `n` calls with `msg`.
  fn failing(self, n: usize, msg: &str) -> Self {
    self
      .failures
      .lock()
      .unwrap()
      .extend(std::iter::repeat(msg.to_string()).take(n));
    self
  }

  /// Block each call until `notify` fires.
  fn held(mut self, notify: Arc<Notify>) -> Self {
    self.hold = Some(notify);
    self
  }

  fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl RemoteSource for ScriptedSource {
  fn subject_id(&self) -> String {
    "123".to_string()
  }

  fn is_logged_in(&self) -> bool {
    self.logged_in.load(Ordering::SeqCst)
  }

  fn is_fake(&self) -> bool {
    self.fake.load(Ordering::SeqCst)
  }

  fn fetch<'a>(
    &'a self,
    _kind: ResourceKind,
    _parent_id: &'a str,
  ) -> BoxFuture<'a, Result<Vec<Item>>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    async move {
      if let Some(hold) = &self.hold {
        hold.notified().await;
      }
      let failure = self.failures.lock().unwrap().pop_front();
      match failure {
        Some(msg) => Err(eyre!("{}", msg)),
        None => Ok(self.response.clone()),
      }
    }
    .boxed()
  }
}

#[derive(Default)]
struct RecordingReporter {
  reports: Mutex<Vec<(String, String)>>,
}

impl Reporter for RecordingReporter {
  fn error(&self, failure: &Report, message: &str) {
    self
      .reports
      .lock()
      .unwrap()
      .push((failure.to_string(), message.to_string()));
  }
}

struct Harness {
  source: Arc<ScriptedSource>,
  cache: Arc<MemoryCache>,
  reporter: Arc<RecordingReporter>,
  coordinator: FetchCoordinator,
}

impl Harness {
  fn new(source: ScriptedSource) -> Self {
    Self::with_cache(source, MemoryCache::with_entries([("123_news_10", r#"[{"id":2}]"#)]))
  }

  fn with_cache(source: ScriptedSource, cache: MemoryCache) -> Self {
    let source = Arc::new(source);
    let cache = Arc::new(cache);
    let reporter = Arc::new(RecordingReporter::default());
    let coordinator = FetchCoordinator::new(
      Arc::new(KeyedStore::default()),
      source.clone(),
      cache.clone(),
      reporter.clone(),
    );
    Self {
      source,
      cache,
      reporter,
      coordinator,
    }
  }

  fn identity(&self) -> Identity {
    Identity::from_source(self.source.as_ref())
  }

  fn state(&self) -> LoadState {
    self.coordinator.store().select(&news_key())
  }

  fn subscribe(&self) -> mpsc::UnboundedReceiver<LoadState> {
    self.coordinator.store().subscribe(&news_key())
  }

  async fn fetch(&self) {
    self
      .coordinator
      .ensure_fresh(&news_key(), &self.identity())
      .expect("sequence should start")
      .await
      .unwrap();
  }

  fn cached(&self) -> Option<String> {
    self.cache.get("123_news_10").unwrap()
  }
}

fn news_key() -> ResourceKey {
  ResourceKey::new("123", ResourceKind::News, "10")
}

fn fresh() -> Vec<Item> {
  vec![json!({"id": 1})]
}

fn stale() -> Vec<Item> {
  vec![json!({"id": 2})]
}

#[tokio::test]
async fn test_initial_state_is_pending() {
  let h = Harness::new(ScriptedSource::new(fresh()));
  let _handle = h.coordinator.ensure_fresh(&news_key(), &h.identity());

  // Nothing has run yet on the current-thread runtime
  let state = h.state();
  assert_eq!(state.status, Status::Pending);
  assert!(state.data.is_none());
}

#[tokio::test]
async fn test_not_logged_in_is_noop() {
  let h = Harness::new(ScriptedSource::new(fresh()));
  h.source.logged_in.store(false, Ordering::SeqCst);

  assert!(h
    .coordinator
    .ensure_fresh(&news_key(), &h.identity())
    .is_none());
  tokio::task::yield_now().await;

  assert_eq!(h.source.calls(), 0);
  assert_eq!(h.state().status, Status::Pending);
  assert_eq!(h.coordinator.gate().marker(&news_key()), None);
}

#[tokio::test]
async fn test_calls_api_once_for_concurrent_requests() {
  let h = Harness::new(ScriptedSource::new(fresh()));
  let identity = h.identity();

  let handles: Vec<_> = (0..5)
    .filter_map(|_| h.coordinator.ensure_fresh(&news_key(), &identity))
    .collect();
  assert_eq!(handles.len(), 1);

  for handle in handles {
    handle.await.unwrap();
  }

  assert_eq!(h.source.calls(), 1);
  assert_eq!(h.state().status, Status::Loaded);

  // Settled keys stay deduplicated
  assert!(h.coordinator.ensure_fresh(&news_key(), &identity).is_none());
  assert_eq!(h.source.calls(), 1);
}

#[tokio::test]
async fn test_cached_data_visible_while_loading() {
  let notify = Arc::new(Notify::new());
  let h = Harness::new(ScriptedSource::new(fresh()).held(notify.clone()));
  let mut updates = h.subscribe();

  let handle = h
    .coordinator
    .ensure_fresh(&news_key(), &h.identity())
    .unwrap();

  assert_eq!(updates.recv().await.unwrap().status, Status::Pending);

  let loading = updates.recv().await.unwrap();
  assert_eq!(loading.status, Status::Loading);
  assert_eq!(loading.data, Some(stale()));
  assert_eq!(h.source.calls(), 1);

  notify.notify_one();
  handle.await.unwrap();

  let loaded = updates.recv().await.unwrap();
  assert_eq!(loaded.status, Status::Loaded);
  assert_eq!(loaded.data, Some(fresh()));
}

#[tokio::test]
async fn test_loading_without_cache_has_no_data() {
  let h = Harness::with_cache(ScriptedSource::new(fresh()), MemoryCache::new());
  let mut updates = h.subscribe();

  h.fetch().await;

  updates.recv().await.unwrap();
  let loading = updates.recv().await.unwrap();
  assert_eq!(loading.status, Status::Loading);
  assert!(loading.data.is_none());
  assert_eq!(h.state().data, Some(fresh()));
}

#[tokio::test]
async fn test_stores_in_cache_if_not_fake() {
  let h = Harness::new(ScriptedSource::new(fresh()));

  h.fetch().await;

  assert_eq!(h.state().data, Some(fresh()));
  assert_eq!(h.cached().as_deref(), Some(r#"[{"id":1}]"#));
}

#[tokio::test]
async fn test_does_not_store_in_cache_if_fake() {
  let h = Harness::new(ScriptedSource::new(fresh()));
  h.source.fake.store(true, Ordering::SeqCst);

  h.fetch().await;

  assert_eq!(h.state().status, Status::Loaded);
  assert_eq!(h.state().data, Some(fresh()));
  assert_eq!(h.cached().as_deref(), Some(r#"[{"id":2}]"#));
}

#[tokio::test]
async fn test_retries_if_api_fails() {
  let h = Harness::new(ScriptedSource::new(fresh()).failing(1, "fail"));
  let mut updates = h.subscribe();

  h.fetch().await;

  let seen: Vec<LoadState> = std::iter::from_fn(|| updates.try_recv().ok()).collect();
  assert_eq!(seen.len(), 4);

  let retrying = &seen[2];
  assert_eq!(retrying.status, Status::Loading);
  assert_eq!(retrying.error.as_ref().unwrap().to_string(), "fail");
  assert_eq!(retrying.data, Some(stale()));
  assert_eq!(retrying.retry_count, 1);

  let done = &seen[3];
  assert_eq!(done.status, Status::Loaded);
  assert!(done.error.is_none());
  assert_eq!(done.retry_count, 0);
  assert_eq!(done.data, Some(fresh()));
  assert_eq!(h.source.calls(), 2);
}

#[tokio::test]
async fn test_gives_up_after_3_retries() {
  let h = Harness::new(ScriptedSource::new(fresh()).failing(3, "fail"));
  let mut updates = h.subscribe();

  h.fetch().await;

  let seen: Vec<LoadState> = std::iter::from_fn(|| updates.try_recv().ok()).collect();
  let statuses: Vec<Status> = seen.iter().map(|s| s.status).collect();
  assert_eq!(
    statuses,
    vec![
      Status::Pending,
      Status::Loading,
      Status::Loading,
      Status::Loading,
      Status::Error
    ]
  );

  let first_failure = &seen[2];
  assert_eq!(first_failure.error.as_ref().unwrap().to_string(), "fail");
  assert_eq!(first_failure.data, Some(stale()));

  let last = h.state();
  assert_eq!(last.status, Status::Error);
  assert_eq!(last.retry_count, 3);
  assert_eq!(last.error.unwrap().to_string(), "fail");
  assert_eq!(last.data, Some(stale()));

  assert_eq!(h.source.calls(), 3);
  // Cache keeps the value that was there before
  assert_eq!(h.cached().as_deref(), Some(r#"[{"id":2}]"#));
  assert_eq!(h.coordinator.gate().marker(&news_key()), Some(Marker::Settled));
}

#[tokio::test]
async fn test_error_without_cache_has_no_data() {
  let h = Harness::with_cache(
    ScriptedSource::new(fresh()).failing(3, "offline"),
    MemoryCache::new(),
  );

  h.fetch().await;

  let state = h.state();
  assert_eq!(state.status, Status::Error);
  assert!(state.data.is_none());
}

#[tokio::test]
async fn test_reports_every_failure() {
  let h = Harness::new(ScriptedSource::new(fresh()).failing(2, "fail"));

  h.fetch().await;

  let reports = h.reporter.reports.lock().unwrap().clone();
  assert_eq!(
    reports,
    vec![
      ("fail".to_string(), "Error getting NEWS from API".to_string()),
      ("fail".to_string(), "Error getting NEWS from API".to_string()),
    ]
  );
}

#[tokio::test]
async fn test_undecodable_cache_is_a_miss() {
  let h = Harness::with_cache(
    ScriptedSource::new(fresh()),
    MemoryCache::with_entries([("123_news_10", "not json")]),
  );
  let mut updates = h.subscribe();

  h.fetch().await;

  updates.recv().await.unwrap();
  assert!(updates.recv().await.unwrap().data.is_none());
  assert_eq!(h.state().status, Status::Loaded);
  assert_eq!(h.cached().as_deref(), Some(r#"[{"id":1}]"#));
}

#[tokio::test]
async fn test_refresh_starts_new_cycle() {
  let h = Harness::new(ScriptedSource::new(fresh()));
  let identity = h.identity();
  h.fetch().await;

  h.coordinator
    .refresh(&news_key(), &identity)
    .expect("settled key should refresh")
    .await
    .unwrap();

  assert_eq!(h.source.calls(), 2);
  assert_eq!(h.state().status, Status::Loaded);
}

#[tokio::test]
async fn test_refresh_while_in_flight_is_noop() {
  let notify = Arc::new(Notify::new());
  let h = Harness::new(ScriptedSource::new(fresh()).held(notify.clone()));
  let identity = h.identity();

  let handle = h.coordinator.ensure_fresh(&news_key(), &identity).unwrap();
  assert!(h.coordinator.refresh(&news_key(), &identity).is_none());

  notify.notify_one();
  handle.await.unwrap();
  assert_eq!(h.source.calls(), 1);
}

#[tokio::test]
async fn test_retry_delay_is_honoured() {
  let mut h = Harness::new(ScriptedSource::new(fresh()).failing(1, "fail"));
  h.coordinator = h
    .coordinator
    .clone()
    .with_retry_delay(Duration::from_millis(5));

  let started = std::time::Instant::now();
  h.fetch().await;

  assert!(started.elapsed() >= Duration::from_millis(5));
  assert_eq!(h.state().status, Status::Loaded);
}

#[tokio::test]
async fn test_clear_mid_sequence_keeps_retry_bound() {
  let notify = Arc::new(Notify::new());
  let h = Harness::new(
    ScriptedSource::new(fresh())
      .failing(10, "fail")
      .held(notify.clone()),
  );
  let mut updates = h.subscribe();
  let handle = h
    .coordinator
    .ensure_fresh(&news_key(), &h.identity())
    .unwrap();

  for expected in 1..=2 {
    notify.notify_one();
    loop {
      let state = updates.recv().await.unwrap();
      if state.retry_count == expected {
        break;
      }
    }
  }

  h.coordinator.store().dispatch(Action::Clear(ClearScope::All));
  notify.notify_one();
  tokio::time::timeout(Duration::from_secs(5), handle)
    .await
    .expect("sequence should settle")
    .unwrap();

  assert_eq!(h.source.calls(), 3);
  assert_eq!(h.reporter.reports.lock().unwrap().len(), 3);

  let state = h.state();
  assert_eq!(state.status, Status::Error);
  assert_eq!(state.retry_count, 3);
}

#[tokio::test]
async fn test_refresh_in_simulated_session_keeps_newer_data() {
  let h = Harness::new(ScriptedSource::new(fresh()));
  h.source.fake.store(true, Ordering::SeqCst);
  h.fetch().await;
  assert_eq!(h.cached().as_deref(), Some(r#"[{"id":2}]"#));

  let mut updates = h.subscribe();
  h.coordinator
    .refresh(&news_key(), &h.identity())
    .expect("settled key should refresh")
    .await
    .unwrap();

  let seen: Vec<LoadState> = std::iter::from_fn(|| updates.try_recv().ok()).collect();
  let statuses: Vec<Status> = seen.iter().map(|s| s.status).collect();
  assert_eq!(
    statuses,
    vec![Status::Loaded, Status::Loading, Status::Loaded]
  );
  assert!(seen.iter().all(|s| s.data == Some(fresh())));
}
