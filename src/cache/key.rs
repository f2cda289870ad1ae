//! Resource identifiers shared by the store, the dedup gate and the persistent cache.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-child collections that can be fetched and cached.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
  News,
  Calendar,
  Notifications,
  Menu,
  Schedule,
}

impl ResourceKind {
  /// Lowercase name used in cache keys and endpoint paths.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::News => "news",
      Self::Calendar => "calendar",
      Self::Notifications => "notifications",
      Self::Menu => "menu",
      Self::Schedule => "schedule",
    }
  }

  /// Uppercase name used in reported messages (e.g. "Error getting NEWS from API").
  pub fn label(&self) -> &'static str {
    match self {
      Self::News => "NEWS",
      Self::Calendar => "CALENDAR",
      Self::Notifications => "NOTIFICATIONS",
      Self::Menu => "MENU",
      Self::Schedule => "SCHEDULE",
    }
  }
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Identifies one cached/fetchable collection: whose session, which kind, which child.
///
/// Ordering is subject first, then kind, then parent, so a store iterates one
/// subject's entries together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
  subject_id: String,
  kind: ResourceKind,
  parent_id: String,
}

impl ResourceKey {
  pub fn new(
    subject_id: impl Into<String>,
    kind: ResourceKind,
    parent_id: impl Into<String>,
  ) -> Self {
    Self {
      subject_id: subject_id.into(),
      kind,
      parent_id: parent_id.into(),
    }
  }

  pub fn subject_id(&self) -> &str {
    &self.subject_id
  }

  pub fn kind(&self) -> ResourceKind {
    self.kind
  }

  pub fn parent_id(&self) -> &str {
    &self.parent_id
  }

  /// Key under which the collection is persisted: `{subject}_{kind}_{parent}`.
  pub fn cache_key(&self) -> String {
    format!("{}_{}_{}", self.subject_id, self.kind, self.parent_id)
  }
}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.cache_key())
  }
}
