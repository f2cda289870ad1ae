use serde::{Deserialize, Serialize};

/// A child whose collections (news, calendar, ...) are fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
  pub id: String,
  #[serde(default)]
  pub name: Option<String>,
}

impl Child {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: None,
    }
  }
}
