//! Async query state for data fetched off the UI loop.
//!
//! A `Query<T>` owns a fetcher closure, spawns it on demand and exposes the
//! outcome through [`Query::poll`], which the event loop calls every tick.
//!
//! # Example
//!
//! ```ignore
//! let api = services.api.clone();
//! let mut query = Query::new(move || {
//!     let api = api.clone();
//!     async move { api.machines().await.ok_or_else(|| "offline".to_string()) }
//! });
//!
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//! ```
//!
//! Only the latest fetch counts: `refetch` aborts the task in flight and
//! dropping the query aborts it too, so a torn-down view never receives a
//! superseded result.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

pub struct Query<T> {
  state: QueryState<T>,
  fetcher: FetcherFn<T>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, String>>>,
  task: Option<JoinHandle<()>>,
  fetched_at: Option<Instant>,
}

impl<T: Send + 'static> Query<T> {
  /// Create a query. The fetcher runs once per `fetch()`/`refetch()`.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move || Box::pin(fetcher())),
      receiver: None,
      task: None,
      fetched_at: None,
    }
  }

  /// Run a one-off future (a mutation, an import) and track its outcome.
  ///
  /// The future is started immediately; later `refetch` calls settle with an
  /// error since there is nothing left to run.
  pub fn once<Fut>(future: Fut) -> Self
  where
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    let slot = std::sync::Mutex::new(Some(future));
    let mut query = Self::new(move || {
      let future = slot.lock().ok().and_then(|mut slot| slot.take());
      async move {
        match future {
          Some(future) => future.await,
          None => Err("Already ran".to_string()),
        }
      }
    });
    query.fetch();
    query
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn error(&self) -> Option<&str> {
    self.state.error()
  }

  /// Whether the last fetch has completed (either way).
  pub fn is_settled(&self) -> bool {
    matches!(self.state, QueryState::Success(_) | QueryState::Error(_))
  }

  /// When the last successful result arrived
  pub fn fetched_at(&self) -> Option<Instant> {
    self.fetched_at
  }

  /// Start fetching unless a fetch is already running.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Abort any fetch in flight and start over.
  pub fn refetch(&mut self) {
    self.cancel();
    self.start_fetch();
  }

  /// Poll for results from a pending fetch.
  ///
  /// Returns `true` if the state changed. Call this in the event loop tick.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.state = QueryState::Success(data);
        self.fetched_at = Some(Instant::now());
        self.finish();
        true
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(error);
        self.finish();
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Task ended without sending (panicked)
        self.state = QueryState::Error("Query was cancelled".to_string());
        self.finish();
        true
      }
    }
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = QueryState::Loading;

    let future = (self.fetcher)();
    self.task = Some(tokio::spawn(async move {
      let result = future.await;
      let _ = tx.send(result);
    }));
  }

  fn finish(&mut self) {
    self.receiver = None;
    self.task = None;
  }

  fn cancel(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
    self.receiver = None;
  }
}

impl<T> Drop for Query<T> {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("fetched_at", &self.fetched_at)
      .finish_non_exhaustive()
  }
}
