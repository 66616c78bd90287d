use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::api::CacheKey;
use crate::cache::LocalCache;
use crate::config::TtlConfig;
use crate::query::{Query, QueryState};

/// Where the data on screen came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
  /// Nothing to show yet
  Loading,
  /// Served from the local cache, network pending
  Cached,
  /// Straight from the network
  Fresh,
  /// Network failed; showing the last cached value
  Stale,
  /// Network failed and nothing was cached
  Offline,
}

impl FeedStatus {
  pub fn label(&self) -> &'static str {
    match self {
      FeedStatus::Loading => "loading",
      FeedStatus::Cached => "cached",
      FeedStatus::Fresh => "live",
      FeedStatus::Stale => "stale",
      FeedStatus::Offline => "Offline",
    }
  }
}

/// Cache-then-network data source for a view.
///
/// `refresh` shows any fresh cached value at once and starts a fetch; `poll`
/// applies the fetch result, writing successful results back to the cache.
pub struct Feed<T> {
  key: String,
  ttl: Duration,
  cache: LocalCache,
  query: Query<T>,
  value: Option<T>,
  status: FeedStatus,
}

impl<T> Feed<T>
where
  T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
  pub fn new<F, Fut>(cache: LocalCache, key: CacheKey, ttl: &TtlConfig, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<T>> + Send + 'static,
  {
    Self::with_key(cache, key.key(), key.ttl(ttl), fetcher)
  }

  pub fn with_key<F, Fut>(cache: LocalCache, key: String, ttl: Duration, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<T>> + Send + 'static,
  {
    let query = Query::new(move || {
      let fut = fetcher();
      async move { fut.await.ok_or_else(|| "offline".to_string()) }
    });

    Self {
      key,
      ttl,
      cache,
      query,
      value: None,
      status: FeedStatus::Loading,
    }
  }

  /// Show the cached value (if fresh) and fetch from the network.
  pub fn refresh(&mut self) {
    if let Some(cached) = self.cache.load::<T>(&self.key, self.ttl) {
      self.value = Some(cached);
      self.status = FeedStatus::Cached;
    } else if self.value.is_none() {
      self.status = FeedStatus::Loading;
    }
    self.query.refetch();
  }

  /// Apply a finished fetch. Returns true when something changed.
  pub fn poll(&mut self) -> bool {
    if !self.query.poll() {
      return false;
    }

    match self.query.state() {
      QueryState::Success(data) => {
        self.cache.save(&self.key, data);
        self.value = Some(data.clone());
        self.status = FeedStatus::Fresh;
      }
      QueryState::Error(_) => {
        self.status = if self.value.is_some() {
          FeedStatus::Stale
        } else {
          FeedStatus::Offline
        };
      }
      QueryState::Idle | QueryState::Loading => {}
    }
    true
  }

  pub fn value(&self) -> Option<&T> {
    self.value.as_ref()
  }

  pub fn status(&self) -> FeedStatus {
    self.status
  }

  /// The latest fetch has completed, successfully or not.
  pub fn is_settled(&self) -> bool {
    self.query.is_settled()
  }

  pub fn is_loading(&self) -> bool {
    self.query.is_loading()
  }

  pub fn fetched_at(&self) -> Option<Instant> {
    self.query.fetched_at()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Arc;

  async fn settle<T>(feed: &mut Feed<T>) -> bool
  where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
  {
    tokio::time::sleep(Duration::from_millis(10)).await;
    feed.poll()
  }

  fn feed(cache: LocalCache, online: Arc<AtomicBool>) -> Feed<Vec<u32>> {
    Feed::new(cache, CacheKey::Machines, &TtlConfig::default(), move || {
      let online = online.load(Ordering::SeqCst);
      async move { online.then(|| vec![1, 2]) }
    })
  }

  #[tokio::test]
  async fn test_cached_value_shown_before_network() {
    let cache = LocalCache::new(Arc::new(MemoryStore::new()));
    cache.save("pj_machines", &vec![9u32]);
    let mut feed = feed(cache.clone(), Arc::new(AtomicBool::new(true)));

    feed.refresh();
    assert_eq!(feed.status(), FeedStatus::Cached);
    assert_eq!(feed.value(), Some(&vec![9]));

    assert!(settle(&mut feed).await);
    assert_eq!(feed.status(), FeedStatus::Fresh);
    assert_eq!(feed.value(), Some(&vec![1, 2]));
    let stored: Option<Vec<u32>> = cache.load("pj_machines", Duration::from_secs(60));
    assert_eq!(stored, Some(vec![1, 2]));
  }

  #[tokio::test]
  async fn test_offline_without_cache() {
    let cache = LocalCache::new(Arc::new(MemoryStore::new()));
    let mut feed = feed(cache, Arc::new(AtomicBool::new(false)));

    feed.refresh();
    assert_eq!(feed.status(), FeedStatus::Loading);
    assert!(settle(&mut feed).await);
    assert_eq!(feed.status(), FeedStatus::Offline);
    assert!(feed.value().is_none());
    assert!(feed.is_settled());
  }

  #[tokio::test]
  async fn test_network_failure_keeps_cached_value() {
    let cache = LocalCache::new(Arc::new(MemoryStore::new()));
    cache.save("pj_machines", &vec![5u32]);
    let mut feed = feed(cache, Arc::new(AtomicBool::new(false)));

    feed.refresh();
    settle(&mut feed).await;
    assert_eq!(feed.status(), FeedStatus::Stale);
    assert_eq!(feed.value(), Some(&vec![5]));
  }

  #[tokio::test]
  async fn test_refresh_keeps_value_after_cache_expiry() {
    let cache = LocalCache::new(Arc::new(MemoryStore::new()));
    let online = Arc::new(AtomicBool::new(true));
    let mut feed = Feed::with_key(cache, "k".to_string(), Duration::ZERO, {
      let online = online.clone();
      move || {
        let online = online.load(Ordering::SeqCst);
        async move { online.then_some(7u32) }
      }
    });

    feed.refresh();
    settle(&mut feed).await;
    assert_eq!(feed.value(), Some(&7));

    online.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(5)).await;
    feed.refresh();
    settle(&mut feed).await;
    assert_eq!(feed.status(), FeedStatus::Stale);
    assert_eq!(feed.value(), Some(&7));
  }
}
