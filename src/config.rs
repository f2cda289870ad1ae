use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::RetryPolicy;
use crate::store::DEFAULT_MAX_RETRIES;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Identifier of the logged-in subject; first segment of every cache key
  pub subject_id: String,
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub fetch: FetchConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
  /// Base url of the REST backend (required unless `fake` is set)
  pub url: Option<String>,
  /// Use the simulated backend; its results are never persisted
  #[serde(default)]
  pub fake: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  #[serde(default)]
  pub retry_delay_ms: u64,
}

impl Default for FetchConfig {
  fn default() -> Self {
    Self {
      max_retries: default_max_retries(),
      retry_delay_ms: 0,
    }
  }
}

fn default_max_retries() -> u32 {
  DEFAULT_MAX_RETRIES
}

impl FetchConfig {
  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_retries: self.max_retries,
      delay: Duration::from_millis(self.retry_delay_ms),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// SQLite file (default: $XDG_DATA_HOME/childnews/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

fn default_true() -> bool {
  true
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./childnews.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/childnews/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/childnews/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("childnews.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("childnews").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Parse and validate a YAML document.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;

    if config.subject_id.trim().is_empty() {
      return Err(eyre!("subject_id must not be empty"));
    }
    if config.fetch.max_retries == 0 {
      return Err(eyre!("fetch.max_retries must be at least 1"));
    }
    if !config.api.fake && config.api.url.is_none() {
      return Err(eyre!("api.url must be set unless api.fake is enabled"));
    }

    Ok(config)
  }

  /// Get the API token from environment variables.
  ///
  /// Checks CHILDNEWS_API_TOKEN first, then API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("CHILDNEWS_API_TOKEN")
      .or_else(|_| std::env::var("API_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set CHILDNEWS_API_TOKEN or API_TOKEN environment variable.")
      })
  }
}
