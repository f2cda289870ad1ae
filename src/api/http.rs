use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use url::Url;

use crate::cache::ResourceKind;
use crate::config::Config;
use crate::store::Item;

use super::source::RemoteSource;

/// REST client for the live backend.
///
/// Collections are read from `GET {base}/children/{child}/{kind}` and must be
/// JSON arrays.
#[derive(Clone)]
pub struct HttpSource {
  client: Client,
  base_url: Url,
  token: Option<String>,
  subject_id: String,
}

impl HttpSource {
  pub fn new(config: &Config) -> Result<Self> {
    let url = config
      .api
      .url
      .as_deref()
      .ok_or_else(|| eyre!("api.url must be set unless api.fake is enabled"))?;

    Self::with_token(url, &config.subject_id, Config::get_api_token().ok())
  }

  /// Build a client against `base_url`. Without a token the source reports
  /// itself as logged out.
  pub fn with_token(base_url: &str, subject_id: &str, token: Option<String>) -> Result<Self> {
    let base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid API url {}: {}", base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("API url cannot be used as a base: {}", base_url));
    }

    let client = Client::builder()
      .user_agent(concat!("childnews/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url,
      token,
      subject_id: subject_id.to_string(),
    })
  }

  /// Endpoint serving `kind` for child `parent_id`.
  pub fn endpoint(&self, kind: ResourceKind, parent_id: &str) -> Result<Url> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| eyre!("API url cannot be used as a base: {}", self.base_url))?
      .pop_if_empty()
      .push("children")
      .push(parent_id)
      .push(kind.as_str());
    Ok(url)
  }

  async fn get_collection(&self, kind: ResourceKind, parent_id: &str) -> Result<Vec<Item>> {
    let url = self.endpoint(kind, parent_id)?;

    let mut request = self.client.get(url);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Failed to get {} for child {}: {}", kind, parent_id, e))?;

    let status = response.status();
    if !status.is_success() {
      return Err(eyre!(
        "Failed to get {} for child {}: server returned {}",
        kind,
        parent_id,
        status
      ));
    }

    response
      .json::<Vec<Item>>()
      .await
      .map_err(|e| eyre!("Failed to parse {} for child {}: {}", kind, parent_id, e))
  }
}

impl RemoteSource for HttpSource {
  fn subject_id(&self) -> String {
    self.subject_id.clone()
  }

  fn is_logged_in(&self) -> bool {
    self.token.is_some()
  }

  fn is_fake(&self) -> bool {
    false
  }

  fn fetch<'a>(
    &'a self,
    kind: ResourceKind,
    parent_id: &'a str,
  ) -> BoxFuture<'a, Result<Vec<Item>>> {
    self.get_collection(kind, parent_id).boxed()
  }
}
