//! Per-key load state and the reducers that move it between statuses.

use color_eyre::Report;
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// Opaque payload of a collection entry. Never inspected by the fetch layer.
pub type Item = serde_json::Value;

/// A captured fetch failure. Shared so `LoadState` stays cheap to clone.
pub type Failure = Arc<Report>;

/// Where a key is in its fetch lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
  /// Nothing has been requested yet
  #[default]
  Pending,
  /// A fetch sequence is running (stale data may be present)
  Loading,
  /// The last fetch succeeded
  Loaded,
  /// Every attempt of the last fetch sequence failed
  Error,
}

impl Status {
  /// True once a fetch sequence has finished, successfully or not.
  pub fn is_settled(&self) -> bool {
    matches!(self, Status::Loaded | Status::Error)
  }
}

/// Snapshot of one key: status, last known data, last failure and retry count.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadState {
  pub status: Status,
  pub data: Option<Vec<Item>>,
  #[serde(serialize_with = "serialize_failure")]
  pub error: Option<Failure>,
  pub retry_count: u32,
}

impl LoadState {
  /// Baseline state of a key nobody has fetched yet.
  pub fn pending() -> Self {
    Self::default()
  }

  /// State after a successful fetch. Replaces everything.
  pub fn loaded(data: Vec<Item>) -> Self {
    Self {
      status: Status::Loaded,
      data: Some(data),
      error: None,
      retry_count: 0,
    }
  }

  /// State at the start of a fetch sequence.
  ///
  /// Data already held wins over the cached copy, which may be older (a
  /// simulated session never rewrites it). The cached copy fills an empty entry.
  pub fn to_loading(&self, cached: Option<Vec<Item>>) -> Self {
    Self {
      status: Status::Loading,
      data: self.data.clone().or(cached),
      error: self.error.clone(),
      retry_count: 0,
    }
  }

  /// State after the `attempt`-th failed attempt (1-based) of the running
  /// sequence. Data is never cleared here.
  /// `retry_count` follows the sequence, not the previous state.
  pub fn to_failed(&self, error: Failure, attempt: u32, max_retries: u32) -> Self {
    let retry_count = attempt.max(1).min(max_retries);
    Self {
      status: if retry_count >= max_retries {
        Status::Error
      } else {
        Status::Loading
      },
      data: self.data.clone(),
      error: Some(error),
      retry_count,
    }
  }
}

fn serialize_failure<S: Serializer>(
  error: &Option<Failure>,
  serializer: S,
) -> Result<S::Ok, S::Error> {
  match error {
    Some(report) => serializer.serialize_some(&report.to_string()),
    None => serializer.serialize_none(),
  }
}
