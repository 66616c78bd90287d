//! Dashboard heuristics: insights, efficiency rollups, maintenance forecast
//! and the persisted event timeline.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::types::{Alert, Machine, MaintenanceTask, Summary};
use crate::api::CacheKey;
use crate::cache::LocalCache;
use crate::config::DashboardConfig;

/// Plain-language observations about the plant.
pub fn compute_insights(
  summary: Option<&Summary>,
  machines: &[Machine],
  alerts: &[Alert],
  config: &DashboardConfig,
) -> Vec<String> {
  let mut insights = Vec::new();

  if alerts.len() > config.alert_volume_threshold {
    insights.push(format!(
      "High alert volume ({}) - investigate common root causes.",
      alerts.len()
    ));
  }

  if let Some(worst) = low_efficiency(machines, 1).first() {
    if let Some(eff) = worst.efficiency {
      if eff < config.low_efficiency_threshold {
        insights.push(format!(
          "Machine {} low efficiency ({}%) - schedule inspection.",
          worst.name, eff
        ));
      }
    }
  }

  if let Some(avg) = summary.and_then(|s| s.avg_efficiency) {
    if avg > 0.0 && avg < config.efficiency_target {
      insights.push(format!(
        "Average efficiency {}% below target. Consider preventive maintenance.",
        avg
      ));
    }
  }

  if insights.is_empty() {
    insights.push("No critical insights - operations stable.".to_string());
  }
  insights
}

/// Up to `limit` machines with known efficiency, lowest first.
pub fn low_efficiency(machines: &[Machine], limit: usize) -> Vec<&Machine> {
  let mut known: Vec<&Machine> = machines.iter().filter(|m| m.efficiency.is_some()).collect();
  known.sort_by(|a, b| {
    let (a, b) = (a.efficiency.unwrap_or(0.0), b.efficiency.unwrap_or(0.0));
    a.total_cmp(&b)
  });
  known.truncate(limit);
  known
}

/// Average efficiency per location, rounded to one decimal. Locations without
/// efficiency data map to `None`.
pub fn plant_summary(machines: &[Machine]) -> BTreeMap<String, Option<f64>> {
  let mut groups: BTreeMap<String, (f64, usize)> = BTreeMap::new();
  for m in machines {
    let location = m.location.clone().unwrap_or_else(|| "Unknown".to_string());
    let entry = groups.entry(location).or_insert((0.0, 0));
    if let Some(eff) = m.efficiency {
      entry.0 += eff;
      entry.1 += 1;
    }
  }

  groups
    .into_iter()
    .map(|(location, (sum, count))| {
      let avg = (count > 0).then(|| (sum / count as f64 * 10.0).round() / 10.0);
      (location, avg)
    })
    .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Forecast {
  /// Scheduled within the next 7 days
  pub upcoming: usize,
  /// Scheduled in the past and not done
  pub overdue: usize,
}

pub fn maintenance_forecast(tasks: &[MaintenanceTask], now: DateTime<Utc>) -> Forecast {
  let horizon = now + chrono::Duration::days(7);
  let mut forecast = Forecast::default();

  for task in tasks {
    let Some(scheduled) = task.scheduled_date.as_deref().and_then(parse_when) else {
      continue;
    };
    if scheduled < now && task.status.as_deref() != Some("done") {
      forecast.overdue += 1;
    }
    if scheduled >= now && scheduled <= horizon {
      forecast.upcoming += 1;
    }
  }
  forecast
}

/// Parse RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` or a bare date (midnight UTC).
pub fn parse_when(value: &str) -> Option<DateTime<Utc>> {
  let value = value.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
    return Some(dt.with_timezone(&Utc));
  }
  for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
      return Some(naive.and_utc());
    }
  }
  NaiveDate::parse_from_str(value, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
  /// When it happened (as reported by the server)
  pub t: String,
  pub text: String,
}

impl TimelineEvent {
  fn new(t: Option<&str>, text: String) -> Self {
    Self {
      t: t.map(str::to_string).unwrap_or_else(|| Utc::now().to_rfc3339()),
      text,
    }
  }
}

pub fn events_from_alerts(alerts: &[Alert]) -> Vec<TimelineEvent> {
  alerts
    .iter()
    .take(8)
    .map(|a| {
      TimelineEvent::new(
        a.raised_at.as_deref(),
        format!(
          "{}: {} - {}",
          a.severity.as_deref().unwrap_or("Alert"),
          a.machine.as_deref().unwrap_or("-"),
          a.message.as_deref().unwrap_or("")
        ),
      )
    })
    .collect()
}

pub fn events_from_maintenance(tasks: &[MaintenanceTask]) -> Vec<TimelineEvent> {
  tasks
    .iter()
    .take(8)
    .map(|t| {
      TimelineEvent::new(
        t.created_at.as_deref(),
        format!(
          "Task: {} - {}",
          t.machine.as_deref().unwrap_or("-"),
          t.description.as_deref().unwrap_or("")
        ),
      )
    })
    .collect()
}

pub fn events_from_machines(machines: &[Machine]) -> Vec<TimelineEvent> {
  machines
    .iter()
    .take(6)
    .map(|m| {
      TimelineEvent::new(
        m.last_seen.as_deref(),
        format!("Seen: {} - {}", m.name, m.status.as_deref().unwrap_or("-")),
      )
    })
    .collect()
}

/// Event log persisted in the local cache, newest first.
pub struct Timeline {
  cache: LocalCache,
  events: Vec<TimelineEvent>,
}

impl Timeline {
  pub const KEEP: usize = 50;
  pub const SHOW: usize = 20;

  pub fn load(cache: LocalCache) -> Self {
    let events = cache
      .load_any(&CacheKey::DashboardTimeline.key())
      .unwrap_or_default();
    Self { cache, events }
  }

  /// Prepend `items` one by one, keep the newest [`Self::KEEP`] and persist.
  pub fn add(&mut self, items: Vec<TimelineEvent>) {
    if items.is_empty() {
      return;
    }
    for item in items {
      self.events.insert(0, item);
    }
    self.events.truncate(Self::KEEP);
    self
      .cache
      .save(&CacheKey::DashboardTimeline.key(), &self.events);
  }

  pub fn visible(&self) -> &[TimelineEvent] {
    &self.events[..self.events.len().min(Self::SHOW)]
  }

  pub fn len(&self) -> usize {
    self.events.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use chrono::TimeZone;
  use std::sync::Arc;

  fn machine(name: &str, location: &str, efficiency: Option<f64>) -> Machine {
    Machine {
      id: 1,
      name: name.to_string(),
      machine_type: None,
      location: Some(location.to_string()),
      status: Some("running".to_string()),
      efficiency,
      last_seen: None,
    }
  }

  fn alert(id: u64) -> Alert {
    Alert {
      id,
      machine_id: None,
      machine: Some("Press".to_string()),
      severity: Some("high".to_string()),
      message: Some("Overheat".to_string()),
      raised_at: Some("2024-05-01T10:00:00Z".to_string()),
    }
  }

  fn task(date: &str, status: Option<&str>) -> MaintenanceTask {
    MaintenanceTask {
      id: None,
      machine_id: None,
      machine: None,
      description: None,
      technician: None,
      priority: None,
      status: status.map(str::to_string),
      scheduled_date: Some(date.to_string()),
      created_at: None,
    }
  }

  #[test]
  fn test_stable_operations() {
    let insights = compute_insights(None, &[], &[], &DashboardConfig::default());
    assert_eq!(insights, vec!["No critical insights - operations stable."]);
  }

  #[test]
  fn test_all_insights_fire() {
    let summary = Summary {
      avg_efficiency: Some(70.5),
      ..Summary::default()
    };
    let machines = vec![machine("A", "Plant A", Some(90.0)), machine("B", "Plant A", Some(42.0))];
    let alerts: Vec<Alert> = (0..6).map(alert).collect();
    let insights = compute_insights(Some(&summary), &machines, &alerts, &DashboardConfig::default());

    assert_eq!(insights.len(), 3);
    assert!(insights[0].contains("High alert volume (6)"));
    assert!(insights[1].contains("Machine B low efficiency (42%)"));
    assert!(insights[2].contains("Average efficiency 70.5%"));
  }

  #[test]
  fn test_low_efficiency_ordering() {
    let machines = vec![
      machine("A", "x", Some(80.0)),
      machine("B", "x", None),
      machine("C", "x", Some(55.0)),
      machine("D", "x", Some(70.0)),
    ];
    let names: Vec<&str> = low_efficiency(&machines, 2).iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["C", "D"]);
  }

  #[test]
  fn test_plant_summary() {
    let machines = vec![
      machine("A", "Plant A", Some(80.0)),
      machine("B", "Plant A", Some(71.0)),
      machine("C", "Plant B", None),
    ];
    let plants = plant_summary(&machines);
    assert_eq!(plants["Plant A"], Some(75.5));
    assert_eq!(plants["Plant B"], None);
  }

  #[test]
  fn test_maintenance_forecast() {
    let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
    let tasks = vec![
      task("2024-05-12", None),
      task("2024-05-17T12:00:00Z", None),
      task("2024-05-20", None),
      task("2024-05-01", None),
      task("2024-05-02", Some("done")),
      task("not a date", None),
    ];
    assert_eq!(
      maintenance_forecast(&tasks, now),
      Forecast {
        upcoming: 2,
        overdue: 1
      }
    );
  }

  #[test]
  fn test_timeline_keeps_newest_fifty() {
    let cache = LocalCache::new(Arc::new(MemoryStore::new()));
    let mut timeline = Timeline::load(cache.clone());

    for batch in 0..7 {
      let alerts: Vec<Alert> = (0..8).map(|i| alert(batch * 8 + i)).collect();
      timeline.add(events_from_alerts(&alerts));
    }
    assert_eq!(timeline.len(), Timeline::KEEP);
    assert_eq!(timeline.visible().len(), Timeline::SHOW);

    let reloaded = Timeline::load(cache);
    assert_eq!(reloaded.len(), Timeline::KEEP);
    assert_eq!(reloaded.visible()[0].text, "high: Press - Overheat");
  }

  #[test]
  fn test_timeline_events_fall_back_to_now() {
    let mut m = machine("Lathe", "x", None);
    m.status = None;
    let events = events_from_machines(&[m]);
    assert_eq!(events[0].text, "Seen: Lathe - -");
    assert!(parse_when(&events[0].t).is_some());
  }
}
