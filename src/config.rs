use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub offline: OfflineConfig,
  #[serde(default)]
  pub dashboard: DashboardConfig,
  /// Where the database and logs live (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
  /// View shown at startup (dashboard, machines, alerts, ...)
  pub default_view: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_server_url")]
  pub url: String,
}

fn default_server_url() -> String {
  "http://localhost:5000".to_string()
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      url: default_server_url(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Disable to skip local response caching entirely
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default)]
  pub ttl: TtlConfig,
}

fn default_true() -> bool {
  true
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      ttl: TtlConfig::default(),
    }
  }
}

/// Cache lifetimes in seconds.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TtlConfig {
  pub summary: u64,
  pub machines: u64,
  pub alerts: u64,
  pub maintenance: u64,
  pub machine_detail: u64,
}

impl Default for TtlConfig {
  fn default() -> Self {
    Self {
      summary: 60,
      machines: 120,
      alerts: 60,
      maintenance: 300,
      machine_detail: 120,
    }
  }
}

impl TtlConfig {
  pub fn summary(&self) -> Duration {
    Duration::from_secs(self.summary)
  }

  pub fn machines(&self) -> Duration {
    Duration::from_secs(self.machines)
  }

  pub fn alerts(&self) -> Duration {
    Duration::from_secs(self.alerts)
  }

  pub fn maintenance(&self) -> Duration {
    Duration::from_secs(self.maintenance)
  }

  pub fn machine_detail(&self) -> Duration {
    Duration::from_secs(self.machine_detail)
  }
}

/// Request router settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OfflineConfig {
  /// Generation holding precached assets and chart images
  pub static_cache: String,
  /// Generation holding API responses
  pub api_cache: String,
  /// Paths fetched at install time
  pub precache: Vec<String>,
  pub api_prefix: String,
  pub chart_prefix: String,
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      static_cache: "imcs-static-v1".to_string(),
      api_cache: "imcs-api-v1".to_string(),
      precache: Vec::new(),
      api_prefix: "/api/".to_string(),
      chart_prefix: "/chart/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
  pub refresh_interval_secs: u64,
  /// Machines below this efficiency (%) are flagged
  pub low_efficiency_threshold: f64,
  /// Plant-wide efficiency goal (%)
  pub efficiency_target: f64,
  /// Alert count above which an alert-volume insight is raised
  pub alert_volume_threshold: usize,
}

impl Default for DashboardConfig {
  fn default() -> Self {
    Self {
      refresh_interval_secs: 60,
      low_efficiency_threshold: 60.0,
      efficiency_target: 75.0,
      alert_volume_threshold: 5,
    }
  }
}

impl DashboardConfig {
  pub fn refresh_interval(&self) -> Duration {
    Duration::from_secs(self.refresh_interval_secs.max(1))
  }
}

impl Config {
  /// Load configuration.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./imcs.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/imcs/config.yaml
  ///
  /// With no file found the defaults are used. `IMCS_SERVER_URL` overrides
  /// the server URL either way.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(url) = std::env::var("IMCS_SERVER_URL") {
      if !url.trim().is_empty() {
        config.server.url = url;
      }
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("imcs.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("imcs").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid (all-defaults) config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Directory for the database and log files.
  pub fn data_dir(&self) -> Result<PathBuf> {
    match &self.data_dir {
      Some(dir) => Ok(dir.clone()),
      None => crate::db::default_data_dir(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.server.url, "http://localhost:5000");
    assert!(config.cache.enabled);
    assert_eq!(config.cache.ttl.maintenance(), Duration::from_secs(300));
    assert_eq!(config.offline.api_prefix, "/api/");
    assert_eq!(config.dashboard.refresh_interval(), Duration::from_secs(60));
  }

  #[test]
  fn test_partial_yaml_fills_defaults() {
    let yaml = r#"
server:
  url: http://plant.local:8080
cache:
  ttl:
    alerts: 15
offline:
  precache: ["/", "/dashboard"]
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.server.url, "http://plant.local:8080");
    assert_eq!(config.cache.ttl.alerts, 15);
    assert_eq!(config.cache.ttl.summary, 60);
    assert!(config.cache.enabled);
    assert_eq!(config.offline.precache.len(), 2);
    assert_eq!(config.offline.static_cache, "imcs-static-v1");
  }

  #[test]
  fn test_empty_file_is_default() {
    let config = Config::parse("  \n").unwrap();
    assert_eq!(config.cache.ttl, TtlConfig::default());
  }

  #[test]
  fn test_missing_explicit_path_errors() {
    let result = Config::load(Some(Path::new("/nonexistent/imcs.yaml")));
    assert!(result.is_err());
  }
}
