use crate::config::OfflineConfig;

/// Caching strategy applied to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Live response preferred, cache only on transport failure
  NetworkFirst,
  /// Cached response served at once, refreshed in the background
  StaleWhileRevalidate,
  /// Cached response if any, else network without populating the cache
  CacheFirst,
}

/// Path prefixes that select a strategy.
#[derive(Debug, Clone)]
pub struct Routes {
  api_prefix: String,
  chart_prefix: String,
}

impl Routes {
  pub fn new(api_prefix: impl Into<String>, chart_prefix: impl Into<String>) -> Self {
    Self {
      api_prefix: api_prefix.into(),
      chart_prefix: chart_prefix.into(),
    }
  }

  pub fn from_config(config: &OfflineConfig) -> Self {
    Self::new(config.api_prefix.clone(), config.chart_prefix.clone())
  }

  /// Pick the strategy for a request path.
  pub fn strategy_for(&self, path: &str) -> Strategy {
    if path.starts_with(&self.api_prefix) {
      Strategy::NetworkFirst
    } else if path.starts_with(&self.chart_prefix) {
      Strategy::StaleWhileRevalidate
    } else {
      Strategy::CacheFirst
    }
  }
}

impl Default for Routes {
  fn default() -> Self {
    Self::new("/api/", "/chart/")
  }
}
