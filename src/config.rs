use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Base URL of the billing API (e.g., "https://billing.example.com")
  pub url: String,
  /// Application identifier issued by the billing provider
  pub app_id: String,
  /// API key; falls back to the BILLING_SYNC_API_KEY environment variable
  pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
  /// Persist the credential and product cache between runs
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Database path (default: $XDG_DATA_HOME/billing-sync/store.db)
  pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
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
  /// 2. ./billing-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/billing-sync/config.yaml
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
        "No configuration file found. Create one at ~/.config/billing-sync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("billing-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("billing-sync").join("config.yaml");
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

  pub fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }
}

pub const API_KEY_ENV: &str = "BILLING_SYNC_API_KEY";

impl BackendConfig {
  /// API key from the config file, or from the environment.
  ///
  /// Blank values count as unset. A missing key is reported at client
  /// construction, not here.
  pub fn resolve_api_key(&self) -> Option<String> {
    self.api_key_or(std::env::var(API_KEY_ENV).ok())
  }

  fn api_key_or(&self, fallback: Option<String>) -> Option<String> {
    let non_blank = |k: &String| !k.trim().is_empty();
    self
      .api_key
      .clone()
      .filter(non_blank)
      .or_else(|| fallback.filter(non_blank))
  }
}
