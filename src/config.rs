use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub routes: RoutesConfig,
  #[serde(default)]
  pub network: NetworkConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base URL of the TripTracker server, e.g. "https://tracker.example.com"
  pub url: String,
  /// Lightweight endpoint used to verify actual connectivity
  #[serde(default = "default_health_path")]
  pub health_path: String,
}

fn default_health_path() -> String {
  "/health/".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Version tag embedded in partition names. Bumping it supersedes every
  /// existing partition on the next activation.
  #[serde(default = "default_cache_version")]
  pub version: String,
  /// Resources fetched into the static partition during install
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
  /// Fallback page served when navigation fails with nothing cached
  #[serde(default = "default_offline_path")]
  pub offline_path: String,
  /// Override for the cache database location (default: data dir)
  pub db_path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: default_cache_version(),
      precache: default_precache(),
      offline_path: default_offline_path(),
      db_path: None,
    }
  }
}

fn default_cache_version() -> String {
  "triptracker-v3".to_string()
}

fn default_offline_path() -> String {
  "/offline/".to_string()
}

fn default_precache() -> Vec<String> {
  [
    "/",
    "/dashboard/",
    "/offline/",
    "/static/css/bootstrap.min.css",
    "/static/css/styles.css",
    "/static/js/bootstrap.bundle.min.js",
    "/static/js/main.js",
    "/static/images/icon-192x192.png",
    "/static/images/icon-512x512.png",
    "/static/manifest.json",
  ]
  .into_iter()
  .map(String::from)
  .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutesConfig {
  #[serde(default = "default_api_prefix")]
  pub api_prefix: String,
  #[serde(default = "default_auth_prefix")]
  pub auth_prefix: String,
  #[serde(default = "default_static_prefix")]
  pub static_prefix: String,
  /// Path prefixes served network-first with an offline page fallback
  #[serde(default = "default_dynamic_prefixes")]
  pub dynamic_prefixes: Vec<String>,
}

impl Default for RoutesConfig {
  fn default() -> Self {
    Self {
      api_prefix: default_api_prefix(),
      auth_prefix: default_auth_prefix(),
      static_prefix: default_static_prefix(),
      dynamic_prefixes: default_dynamic_prefixes(),
    }
  }
}

fn default_api_prefix() -> String {
  "/api/".to_string()
}

fn default_auth_prefix() -> String {
  "/accounts/".to_string()
}

fn default_static_prefix() -> String {
  "/static/".to_string()
}

fn default_dynamic_prefixes() -> Vec<String> {
  [
    "/vehicles/",
    "/events/",
    "/todos/",
    "/locations/",
    "/families/",
    "/maintenance-schedules/",
    "/reports/",
  ]
  .into_iter()
  .map(String::from)
  .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  /// How often the health endpoint is probed, in seconds
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
  /// Timeout applied to network-first fetches and probes, in seconds
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: default_probe_interval_secs(),
      request_timeout_secs: default_request_timeout_secs(),
    }
  }
}

fn default_probe_interval_secs() -> u64 {
  30
}

fn default_request_timeout_secs() -> u64 {
  10
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tripsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tripsync/config.yaml
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
        "No configuration file found. Create one at ~/.config/tripsync/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("tripsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tripsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}
