mod alerts;
mod dashboard;
mod datasets;
mod machine_detail;
mod machines;
mod maintenance;
mod records;

pub use alerts::AlertsView;
pub use dashboard::DashboardView;
pub use datasets::DatasetsView;
pub use machine_detail::MachineDetailView;
pub use machines::MachinesView;
pub use maintenance::MaintenanceView;
pub use records::RecordsView;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

use crate::api::{CacheKey, ImcsClient};
use crate::feed::Feed;
use crate::query::{Query, QueryState};
use crate::services::Services;
use crate::ui::view::View;

/// Root view for a command palette name.
pub fn root_view(name: &str, services: &Services) -> Option<Box<dyn View>> {
  let view: Box<dyn View> = match name {
    "dashboard" => Box::new(DashboardView::new(services.clone())),
    "machines" => Box::new(MachinesView::new(services.clone())),
    "alerts" => Box::new(AlertsView::new(services.clone())),
    "maintenance" => Box::new(MaintenanceView::new(services.clone())),
    "datasets" => Box::new(DatasetsView::new(services.clone())),
    "records" => Box::new(RecordsView::new(services.clone())),
    _ => return None,
  };
  Some(view)
}

/// Feed backed by an API call and the view's cache slot, already refreshing.
fn api_feed<T, F, Fut>(services: &Services, key: CacheKey, fetch: F) -> Feed<T>
where
  T: Serialize + DeserializeOwned + Clone + Send + 'static,
  F: Fn(ImcsClient) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Option<T>> + Send + 'static,
{
  let api = services.api.clone();
  let mut feed = Feed::new(
    services.cache.clone(),
    key,
    &services.config.cache.ttl,
    move || fetch(api.clone()),
  );
  feed.refresh();
  feed
}

/// Background mutation or export whose outcome becomes a notice or an alert.
struct Pending(Query<String>);

impl Pending {
  fn spawn<Fut>(future: Fut) -> Self
  where
    Fut: Future<Output = color_eyre::Result<String>> + Send + 'static,
  {
    Self(Query::once(async move {
      future.await.map_err(|e| e.to_string())
    }))
  }

  /// Take the outcome out of `slot` once the task has finished.
  fn settle(slot: &mut Option<Pending>) -> Option<Result<String, String>> {
    let pending = slot.as_mut()?;
    if !pending.0.poll() {
      return None;
    }
    let outcome = match pending.0.state() {
      QueryState::Success(message) => Ok(message.clone()),
      QueryState::Error(error) => Err(error.clone()),
      QueryState::Idle | QueryState::Loading => return None,
    };
    *slot = None;
    Some(outcome)
  }
}
