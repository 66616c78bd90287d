use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::http::{Network, Request, Response};
use super::lifecycle::{LifecycleEvent, WorkerState};
use super::router::{Routes, Strategy};
use super::store::ResponseStore;
use crate::config::OfflineConfig;

/// In-process request router modelled on a browser service worker.
///
/// Every client request goes through [`ServiceWorker::fetch`]. Once activated it
/// serves API paths network-first, chart images stale-while-revalidate and
/// everything else cache-first, using two named cache generations.
pub struct ServiceWorker {
  state: WorkerState,
  static_cache: String,
  api_cache: String,
  precache: Vec<String>,
  routes: Routes,
  store: Arc<dyn ResponseStore>,
  network: Arc<dyn Network>,
}

impl ServiceWorker {
  pub fn new(
    config: &OfflineConfig,
    store: Arc<dyn ResponseStore>,
    network: Arc<dyn Network>,
  ) -> Self {
    Self {
      state: WorkerState::Parsed,
      static_cache: config.static_cache.clone(),
      api_cache: config.api_cache.clone(),
      precache: config.precache.clone(),
      routes: Routes::from_config(config),
      store,
      network,
    }
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  /// Install then activate. Failures are logged; a worker that fails to
  /// install stays redundant. It still answers from generations stored by an
  /// earlier session when the network is down.
  pub async fn start(mut self) -> Arc<Self> {
    match self.install().await {
      Ok(()) => {
        if let Err(e) = self.activate() {
          warn!(error = %e, "request router activation failed");
        }
      }
      Err(e) => warn!(error = %e, "request router install failed"),
    }
    Arc::new(self)
  }

  /// Populate the static generation with the precache list.
  ///
  /// All assets must be fetched successfully before anything is stored.
  pub async fn install(&mut self) -> Result<()> {
    self.state = self.state.transition(LifecycleEvent::Install)?;

    match self.precache_assets().await {
      Ok(count) => {
        // skip-waiting: installed workers activate right away
        self.state = self.state.transition(LifecycleEvent::InstallSucceeded)?;
        info!(cache = %self.static_cache, assets = count, "request router installed");
        Ok(())
      }
      Err(e) => {
        self.state = self.state.transition(LifecycleEvent::InstallFailed)?;
        Err(e)
      }
    }
  }

  async fn precache_assets(&self) -> Result<usize> {
    let fetches = self.precache.iter().map(|url| {
      let network = Arc::clone(&self.network);
      let url = url.clone();
      async move {
        let response = network.fetch(Request::get(url.clone())).await?;
        if !response.is_ok() {
          return Err(eyre!("Precache of {} returned {}", url, response.status));
        }
        Ok((url, response))
      }
    });
    let responses = futures::future::try_join_all(fetches).await?;

    self.store.open(&self.static_cache)?;
    for (url, response) in &responses {
      self.store.put(&self.static_cache, url, response)?;
    }

    Ok(responses.len())
  }

  /// Delete every generation outside the allow-list and start controlling clients.
  ///
  /// Returns the names of the deleted generations.
  pub fn activate(&mut self) -> Result<Vec<String>> {
    self.state = self.state.transition(LifecycleEvent::Activate)?;

    let allowed = [self.static_cache.as_str(), self.api_cache.as_str()];
    let mut deleted = Vec::new();
    for name in self.store.cache_names()? {
      if !allowed.contains(&name.as_str()) && self.store.delete(&name)? {
        deleted.push(name);
      }
    }
    if !deleted.is_empty() {
      info!(?deleted, "purged stale cache generations");
    }

    self.state = self.state.transition(LifecycleEvent::Claimed)?;
    Ok(deleted)
  }

  /// Route a request. Never fails: unreachable resources come back as 503s.
  pub async fn fetch(&self, request: Request) -> Response {
    if !self.state.controls_clients() {
      return self.passthrough(request).await;
    }

    match self.routes.strategy_for(request.path()) {
      Strategy::NetworkFirst => self.network_first(request).await,
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
      Strategy::CacheFirst => self.cache_first(request).await,
    }
  }

  async fn passthrough(&self, request: Request) -> Response {
    let is_api = self.routes.strategy_for(request.path()) == Strategy::NetworkFirst;
    match self.network.fetch(request.clone()).await {
      Ok(response) => response,
      Err(e) => {
        debug!(error = %e, "network unavailable");
        match self.cached(&request) {
          Some(cached) => cached,
          None if is_api => Response::offline_json(),
          None => Response::unavailable(),
        }
      }
    }
  }

  async fn network_first(&self, request: Request) -> Response {
    match self.network.fetch(request.clone()).await {
      Ok(response) => {
        if request.is_get() && response.is_ok() {
          if let Err(e) = self.store.put(&self.api_cache, &request.url, &response) {
            debug!(url = %request.url, error = %e, "failed to cache api response");
          }
        }
        response
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "network-first fell back to cache");
        self
          .cached(&request)
          .unwrap_or_else(Response::offline_json)
      }
    }
  }

  async fn stale_while_revalidate(&self, request: Request) -> Response {
    let cached = self.cached(&request);

    let store = Arc::clone(&self.store);
    let network = Arc::clone(&self.network);
    let cache_name = self.static_cache.clone();
    let revalidate = async move {
      match network.fetch(request.clone()).await {
        Ok(response) => {
          if request.is_get() && response.is_ok() {
            if let Err(e) = store.put(&cache_name, &request.url, &response) {
              debug!(url = %request.url, error = %e, "failed to refresh cached response");
            }
          }
          Some(response)
        }
        Err(e) => {
          debug!(url = %request.url, error = %e, "revalidation failed");
          None
        }
      }
    };

    match cached {
      Some(cached) => {
        tokio::spawn(revalidate);
        cached
      }
      None => revalidate.await.unwrap_or_else(Response::unavailable),
    }
  }

  async fn cache_first(&self, request: Request) -> Response {
    if let Some(cached) = self.cached(&request) {
      return cached;
    }
    match self.network.fetch(request).await {
      Ok(response) => response,
      Err(e) => {
        debug!(error = %e, "cache-first miss while offline");
        Response::unavailable()
      }
    }
  }

  fn cached(&self, request: &Request) -> Option<Response> {
    if !request.is_get() {
      return None;
    }
    match self.store.lookup(&request.url) {
      Ok(found) => found,
      Err(e) => {
        debug!(url = %request.url, error = %e, "cache lookup failed");
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::offline::store::MemoryResponseStore;
  use crate::offline::testing::FakeNetwork;
  use reqwest::Method;
  use std::time::Duration;

  fn config() -> OfflineConfig {
    OfflineConfig::default()
  }

  async fn activated(
    store: Arc<MemoryResponseStore>,
    network: Arc<FakeNetwork>,
  ) -> ServiceWorker {
    let mut worker = ServiceWorker::new(&config(), store, network);
    worker.install().await.unwrap();
    worker.activate().unwrap();
    worker
  }

  #[tokio::test]
  async fn test_activation_purges_unlisted_generations() {
    let store = Arc::new(MemoryResponseStore::new());
    store.open("v1").unwrap();
    store.open("v2").unwrap();

    let config = OfflineConfig {
      static_cache: "v2".to_string(),
      ..OfflineConfig::default()
    };
    let mut worker = ServiceWorker::new(&config, store.clone(), Arc::new(FakeNetwork::new()));
    worker.install().await.unwrap();
    let deleted = worker.activate().unwrap();

    assert_eq!(deleted, vec!["v1".to_string()]);
    assert_eq!(store.cache_names().unwrap(), vec!["v2".to_string()]);
    assert_eq!(worker.state(), WorkerState::Activated);
  }

  #[tokio::test]
  async fn test_install_precaches_all_assets() {
    let network = Arc::new(FakeNetwork::new());
    network.respond("/", Response::new(200, b"home".to_vec()));
    network.respond("/dashboard", Response::new(200, b"dash".to_vec()));
    let store = Arc::new(MemoryResponseStore::new());

    let config = OfflineConfig {
      precache: vec!["/".to_string(), "/dashboard".to_string()],
      ..OfflineConfig::default()
    };
    let mut worker = ServiceWorker::new(&config, store.clone(), network);
    worker.install().await.unwrap();

    assert_eq!(worker.state(), WorkerState::Installed);
    assert_eq!(store.lookup("/dashboard").unwrap().unwrap().body, b"dash");
  }

  #[tokio::test]
  async fn test_install_is_atomic() {
    let network = Arc::new(FakeNetwork::new());
    network.respond("/", Response::new(200, b"home".to_vec()));
    let store = Arc::new(MemoryResponseStore::new());

    let config = OfflineConfig {
      precache: vec!["/".to_string(), "/missing".to_string()],
      ..OfflineConfig::default()
    };
    let mut worker = ServiceWorker::new(&config, store.clone(), network);
    assert!(worker.install().await.is_err());

    assert_eq!(worker.state(), WorkerState::Redundant);
    assert_eq!(store.lookup("/").unwrap(), None);
  }

  #[tokio::test]
  async fn test_network_first_stores_and_falls_back() {
    let network = Arc::new(FakeNetwork::new());
    network.respond("/api/machines", Response::new(200, b"[1]".to_vec()));
    let worker = activated(Arc::new(MemoryResponseStore::new()), network.clone()).await;

    let live = worker.fetch(Request::get("/api/machines")).await;
    assert_eq!(live.body, b"[1]");

    network.set_online(false);
    let fallback = worker.fetch(Request::get("/api/machines")).await;
    assert_eq!(fallback.body, b"[1]");
  }

  #[tokio::test]
  async fn test_network_first_offline_without_cache() {
    let network = Arc::new(FakeNetwork::new());
    network.set_online(false);
    let worker = activated(Arc::new(MemoryResponseStore::new()), network).await;

    let response = worker.fetch(Request::get("/api/alerts?ack=0")).await;
    assert_eq!(response, Response::offline_json());
  }

  #[tokio::test]
  async fn test_network_first_does_not_cache_errors_or_posts() {
    let network = Arc::new(FakeNetwork::new());
    network.respond("/api/summary", Response::new(500, b"boom".to_vec()));
    network.respond("/api/alerts/1/ack", Response::new(200, br#"{"ok":true}"#.to_vec()));
    let store = Arc::new(MemoryResponseStore::new());
    let worker = activated(store.clone(), network).await;

    let response = worker.fetch(Request::get("/api/summary")).await;
    assert_eq!(response.status, 500);
    let ack = Request::json(Method::POST, "/api/alerts/1/ack", &serde_json::json!({})).unwrap();
    assert!(worker.fetch(ack).await.is_ok());

    assert_eq!(store.lookup("/api/summary").unwrap(), None);
    assert_eq!(store.lookup("/api/alerts/1/ack").unwrap(), None);
  }

  #[tokio::test]
  async fn test_stale_while_revalidate_serves_cache_then_refreshes() {
    let network = Arc::new(FakeNetwork::new());
    let store = Arc::new(MemoryResponseStore::new());
    store
      .put("imcs-static-v1", "/chart/summary.png", &Response::new(200, b"old".to_vec()))
      .unwrap();
    network.respond("/chart/summary.png", Response::new(200, b"new".to_vec()));
    let worker = activated(store.clone(), network).await;

    let served = worker.fetch(Request::get("/chart/summary.png")).await;
    assert_eq!(served.body, b"old");

    tokio::time::sleep(Duration::from_millis(10)).await;
    let refreshed = store.lookup("/chart/summary.png").unwrap().unwrap();
    assert_eq!(refreshed.body, b"new");
  }

  #[tokio::test]
  async fn test_stale_while_revalidate_waits_without_cache() {
    let network = Arc::new(FakeNetwork::new());
    network.respond("/chart/status.png", Response::new(200, b"png".to_vec()));
    let store = Arc::new(MemoryResponseStore::new());
    let worker = activated(store.clone(), network.clone()).await;

    let served = worker.fetch(Request::get("/chart/status.png")).await;
    assert_eq!(served.body, b"png");
    assert!(store.lookup("/chart/status.png").unwrap().is_some());

    network.set_online(false);
    let missing = worker.fetch(Request::get("/chart/trend/9.png")).await;
    assert_eq!(missing.status, 503);
  }

  #[tokio::test]
  async fn test_cache_first_does_not_populate() {
    let network = Arc::new(FakeNetwork::new());
    network.respond("/reports", Response::new(200, b"page".to_vec()));
    let store = Arc::new(MemoryResponseStore::new());
    let worker = activated(store.clone(), network.clone()).await;

    let served = worker.fetch(Request::get("/reports")).await;
    assert_eq!(served.body, b"page");
    assert_eq!(store.lookup("/reports").unwrap(), None);
    assert_eq!(network.calls(), 1);
  }

  #[tokio::test]
  async fn test_inactive_worker_passes_through() {
    let network = Arc::new(FakeNetwork::new());
    network.respond("/api/machines", Response::new(200, b"[]".to_vec()));
    let store = Arc::new(MemoryResponseStore::new());
    let worker = ServiceWorker::new(&config(), store.clone(), network.clone());

    assert_eq!(worker.fetch(Request::get("/api/machines")).await.body, b"[]");
    assert_eq!(store.lookup("/api/machines").unwrap(), None);

    network.set_online(false);
    assert_eq!(
      worker.fetch(Request::get("/api/machines")).await,
      Response::offline_json()
    );
  }

  #[tokio::test]
  async fn test_failed_install_still_serves_earlier_generations() {
    let network = Arc::new(FakeNetwork::new());
    network.set_online(false);
    let store = Arc::new(MemoryResponseStore::new());
    store
      .put("imcs-api-v1", "/api/machines", &Response::new(200, b"[1]".to_vec()))
      .unwrap();

    let config = OfflineConfig {
      precache: vec!["/".to_string()],
      ..OfflineConfig::default()
    };
    let worker = ServiceWorker::new(&config, store, network).start().await;
    assert_eq!(worker.state(), WorkerState::Redundant);

    let response = worker.fetch(Request::get("/api/machines")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"[1]");

    let missing = worker.fetch(Request::get("/api/alerts")).await;
    assert_eq!(missing, Response::offline_json());
  }
}
