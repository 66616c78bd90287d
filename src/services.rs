use std::sync::Arc;

use crate::api::ImcsClient;
use crate::cache::LocalCache;
use crate::config::Config;
use crate::dataset::DatasetStore;

/// Shared handles passed to every view constructor.
#[derive(Clone)]
pub struct Services {
  pub api: ImcsClient,
  pub cache: LocalCache,
  pub datasets: DatasetStore,
  pub config: Arc<Config>,
}

impl Services {
  pub fn new(
    api: ImcsClient,
    cache: LocalCache,
    datasets: DatasetStore,
    config: Arc<Config>,
  ) -> Self {
    Self {
      api,
      cache,
      datasets,
      config,
    }
  }
}

#[cfg(test)]
pub mod testing {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::db::Database;
  use crate::offline::testing::FakeNetwork;
  use crate::offline::{MemoryResponseStore, ServiceWorker};
  use url::Url;

  /// Services wired to an in-memory database, store and fake network.
  pub async fn services(network: Arc<FakeNetwork>) -> Services {
    let config = Config::default();
    let worker = ServiceWorker::new(
      &config.offline,
      Arc::new(MemoryResponseStore::new()),
      network,
    )
    .start()
    .await;
    let api = ImcsClient::new(
      worker,
      reqwest::Client::new(),
      Url::parse(&config.server.url).unwrap(),
    );
    let db = Arc::new(Database::open_in_memory().unwrap());
    Services::new(
      api,
      LocalCache::new(Arc::new(MemoryStore::new())),
      DatasetStore::new(db),
      Arc::new(config),
    )
  }
}
