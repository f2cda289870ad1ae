use color_eyre::Result;
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::json;

use crate::cache::ResourceKind;
use crate::store::Item;

use super::source::RemoteSource;

/// Simulated backend for demo sessions.
///
/// Always logged in and always reports `is_fake() == true`, so nothing it
/// returns is ever written to the persistent cache.
#[derive(Debug, Clone)]
pub struct FakeSource {
  subject_id: String,
}

impl FakeSource {
  pub fn new(subject_id: impl Into<String>) -> Self {
    Self {
      subject_id: subject_id.into(),
    }
  }

  fn canned(kind: ResourceKind, parent_id: &str) -> Vec<Item> {
    match kind {
      ResourceKind::News => vec![
        json!({
          "id": format!("{}-news-1", parent_id),
          "header": "Welcome back",
          "intro": "The new term starts on Monday.",
          "published": "2024-08-19T08:00:00Z",
        }),
        json!({
          "id": format!("{}-news-2", parent_id),
          "header": "Parent meeting",
          "intro": "Parent meeting in the assembly hall on Thursday at 18:00.",
          "published": "2024-08-26T12:30:00Z",
        }),
      ],
      ResourceKind::Calendar => vec![json!({
        "id": format!("{}-event-1", parent_id),
        "title": "Field trip",
        "startDate": "2024-09-12",
      })],
      ResourceKind::Notifications => vec![json!({
        "id": format!("{}-notification-1", parent_id),
        "message": "New message from the class teacher",
      })],
      ResourceKind::Menu => vec![
        json!({ "title": "Monday", "description": "Vegetable soup" }),
        json!({ "title": "Tuesday", "description": "Fish and potatoes" }),
      ],
      ResourceKind::Schedule => vec![json!({
        "id": format!("{}-lesson-1", parent_id),
        "title": "Mathematics",
        "startTime": "08:15",
        "endTime": "09:00",
      })],
    }
  }
}

impl RemoteSource for FakeSource {
  fn subject_id(&self) -> String {
    self.subject_id.clone()
  }

  fn is_logged_in(&self) -> bool {
    true
  }

  fn is_fake(&self) -> bool {
    true
  }

  fn fetch<'a>(
    &'a self,
    kind: ResourceKind,
    parent_id: &'a str,
  ) -> BoxFuture<'a, Result<Vec<Item>>> {
    future::ready(Ok(Self::canned(kind, parent_id))).boxed()
  }
}
