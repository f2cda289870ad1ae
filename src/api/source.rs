use color_eyre::Result;
use futures::future::BoxFuture;

use crate::cache::ResourceKind;
use crate::store::Item;

/// Remote provider of per-child collections.
pub trait RemoteSource: Send + Sync {
  /// Identifier of the logged-in subject (personal number or account id).
  fn subject_id(&self) -> String;

  /// Whether the session may fetch at all.
  fn is_logged_in(&self) -> bool;

  /// Whether this is a simulated session whose results must not be persisted.
  fn is_fake(&self) -> bool;

  /// Fetch the `kind` collection belonging to child `parent_id`.
  fn fetch<'a>(&'a self, kind: ResourceKind, parent_id: &'a str)
    -> BoxFuture<'a, Result<Vec<Item>>>;

  /// Fetch a child's news.
  fn get_news<'a>(&'a self, parent_id: &'a str) -> BoxFuture<'a, Result<Vec<Item>>> {
    self.fetch(ResourceKind::News, parent_id)
  }
}

/// Who is asking, captured at the time of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
  subject_id: String,
  logged_in: bool,
}

impl Identity {
  pub fn new(subject_id: impl Into<String>, logged_in: bool) -> Self {
    Self {
      subject_id: subject_id.into(),
      logged_in,
    }
  }

  /// Snapshot the identity a source currently reports.
  pub fn from_source(source: &dyn RemoteSource) -> Self {
    Self::new(source.subject_id(), source.is_logged_in())
  }

  pub fn subject_id(&self) -> &str {
    &self.subject_id
  }

  pub fn is_authenticated(&self) -> bool {
    self.logged_in && !self.subject_id.is_empty()
  }
}
