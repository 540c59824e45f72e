use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub upstream: UpstreamConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub hours: HoursConfig,
  /// Override for the SQLite database path (defaults to the XDG data dir).
  pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
  /// Base URL of the upstream project-management API.
  pub url: String,
  /// Maximum attempts per call, including the first.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Initial backoff delay in milliseconds.
  #[serde(default = "default_retry_delay_ms")]
  pub retry_delay_ms: u64,
  /// Backoff cap in milliseconds.
  #[serde(default = "default_max_retry_delay_ms")]
  pub max_retry_delay_ms: u64,
  /// Requests allowed per rolling window.
  #[serde(default = "default_rate_limit")]
  pub requests_per_window: usize,
  /// Rolling window length in seconds.
  #[serde(default = "default_rate_window_secs")]
  pub rate_window_secs: u64,
  /// Per-request deadline in seconds.
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// Rows requested per page.
  #[serde(default = "default_page_size")]
  pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Interval for the `watch` auto-sync loop, in seconds.
  #[serde(default = "default_sync_interval_secs")]
  pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// TTL for narrow (per-period, per-id) cache keys, in seconds.
  #[serde(default = "default_cache_ttl_secs")]
  pub ttl_secs: u64,
  /// TTL for the broad fallback key, in seconds.
  #[serde(default = "default_global_ttl_secs")]
  pub global_ttl_secs: u64,
  /// Directory for on-disk cache snapshots. None disables the tier.
  pub snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HoursConfig {
  /// Whether approved leave is added into `actual_hours`. The source
  /// dashboards disagreed between week and month views; we default to the
  /// week convention (actual = written) and make the other opt-in.
  #[serde(default)]
  pub count_leave_as_actual: bool,
}

fn default_max_retries() -> u32 {
  5
}
fn default_retry_delay_ms() -> u64 {
  500
}
fn default_max_retry_delay_ms() -> u64 {
  30_000
}
fn default_rate_limit() -> usize {
  25
}
fn default_rate_window_secs() -> u64 {
  5
}
fn default_timeout_secs() -> u64 {
  30
}
fn default_page_size() -> usize {
  100
}
fn default_sync_interval_secs() -> u64 {
  3600
}
fn default_cache_ttl_secs() -> u64 {
  // Upstream data only changes on explicit sync, so hours-long TTLs are fine.
  12 * 3600
}
fn default_global_ttl_secs() -> u64 {
  24 * 3600
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: default_sync_interval_secs(),
    }
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_secs: default_cache_ttl_secs(),
      global_ttl_secs: default_global_ttl_secs(),
      snapshot_dir: None,
    }
  }
}

impl Default for HoursConfig {
  fn default() -> Self {
    Self {
      count_leave_as_actual: false,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./urenteller.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/urenteller/config.yaml
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
        "No configuration file found. Create one at ~/.config/urenteller/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("urenteller.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("urenteller").join("config.yaml");
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

  /// Get the upstream API key from the environment.
  ///
  /// Checks URENTELLER_API_KEY first, then UPSTREAM_API_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("URENTELLER_API_KEY")
      .or_else(|_| std::env::var("UPSTREAM_API_KEY"))
      .map_err(|_| {
        eyre!("API key not found. Set URENTELLER_API_KEY or UPSTREAM_API_KEY environment variable.")
      })
  }
}

impl UpstreamConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  pub fn retry_delay(&self) -> Duration {
    Duration::from_millis(self.retry_delay_ms)
  }

  pub fn max_retry_delay(&self) -> Duration {
    Duration::from_millis(self.max_retry_delay_ms)
  }

  pub fn rate_window(&self) -> Duration {
    Duration::from_secs(self.rate_window_secs)
  }
}
