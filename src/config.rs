use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::storefront::endpoints::PAGE_SIZE;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub feed: FeedConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_api_url")]
  pub url: String,
  /// Per-request timeout
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: default_api_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_api_url() -> String {
  "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Age after which a cached entry is refetched. Unset means entries stay
  /// fresh until invalidated.
  pub stale_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
  #[serde(default = "default_page_size")]
  pub page_size: usize,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      page_size: default_page_size(),
    }
  }
}

fn default_page_size() -> usize {
  PAGE_SIZE
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Default filter when RUST_LOG is unset
  #[serde(default = "default_log_level")]
  pub level: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./storefront.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/storefront-sync/config.yaml
  ///
  /// Without any file the defaults are used; every field has one.
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
      None => {
        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("storefront.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("storefront-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.base_url()?;
    if config.feed.page_size == 0 {
      return Err(eyre!("feed.page_size must be at least 1"));
    }
    Ok(config)
  }

  pub fn base_url(&self) -> Result<Url> {
    Url::parse(&self.api.url).map_err(|e| eyre!("Invalid api.url {}: {}", self.api.url, e))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn stale_after(&self) -> Option<chrono::Duration> {
    self
      .cache
      .stale_after_secs
      .and_then(|secs| i64::try_from(secs).ok())
      .map(chrono::Duration::seconds)
  }

  /// Get the API token from the environment, if the session is signed in.
  ///
  /// Reads STOREFRONT_TOKEN. No token means an anonymous session.
  pub fn api_token() -> Option<String> {
    std::env::var("STOREFRONT_TOKEN")
      .ok()
      .filter(|token| !token.trim().is_empty())
  }

  /// Directory for log files.
  pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
      .unwrap_or_else(std::env::temp_dir)
      .join("storefront-sync")
  }
}
