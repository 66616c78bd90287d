use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, TableState, Wrap};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use super::machines::{filter_machines, machine_table};
use super::{api_feed, MachineDetailView, Pending};
use crate::api::types::{Alert, Machine, MaintenanceTask, Summary};
use crate::api::CacheKey;
use crate::feed::{Feed, FeedStatus};
use crate::insights::{
  compute_insights, events_from_alerts, events_from_machines, events_from_maintenance,
  low_efficiency, maintenance_forecast, plant_summary, Timeline,
};
use crate::services::Services;
use crate::ui::components::{KeyResult, SearchInput};
use crate::ui::renderfns::{
  draw_bar_chart, draw_line_chart, fmt_opt, severity_color, truncate, Series,
};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::{ensure_valid_selection, move_selection};

const ALERTS_SHOWN: usize = 10;
const LOW_EFFICIENCY_SHOWN: usize = 6;

/// Ordering for the header badge: the least trustworthy feed wins.
fn rank(status: FeedStatus) -> u8 {
  match status {
    FeedStatus::Fresh => 0,
    FeedStatus::Cached => 1,
    FeedStatus::Loading => 2,
    FeedStatus::Stale => 3,
    FeedStatus::Offline => 4,
  }
}

fn trend_series(summary: &Summary) -> (Vec<Series>, Vec<String>) {
  let trend = &summary.performance_trend;
  let points = trend
    .iter()
    .enumerate()
    .map(|(i, p)| (i as f64, p.value))
    .collect();
  let labels = match (trend.first(), trend.last()) {
    (Some(first), Some(last)) if trend.len() > 1 => vec![first.date.clone(), last.date.clone()],
    (Some(only), _) => vec![only.date.clone()],
    _ => Vec::new(),
  };
  (vec![Series::new("efficiency %", points)], labels)
}

/// Status counts from the summary, or counted from the machine list when the
/// server sent none.
fn status_bars(summary: Option<&Summary>, machines: &[Machine]) -> Vec<(String, u64)> {
  if let Some(summary) = summary.filter(|s| !s.status_distribution.is_empty()) {
    return summary
      .status_distribution
      .iter()
      .map(|(status, count)| (status.clone(), *count))
      .collect();
  }
  let mut counts: BTreeMap<String, u64> = BTreeMap::new();
  for m in machines {
    *counts
      .entry(m.status.clone().unwrap_or_else(|| "unknown".to_string()))
      .or_default() += 1;
  }
  counts.into_iter().collect()
}

pub struct DashboardView {
  services: Services,
  summary: Feed<Summary>,
  machines: Feed<Vec<Machine>>,
  alerts: Feed<Vec<Alert>>,
  maintenance: Feed<Vec<MaintenanceTask>>,
  timeline: Timeline,
  insights: Vec<String>,
  awaiting_insights: bool,
  last_refresh: Instant,
  table_state: TableState,
  search: SearchInput,
  export: Option<Pending>,
}

impl DashboardView {
  pub fn new(services: Services) -> Self {
    let summary = api_feed(&services, CacheKey::DashboardSummary, |api| async move {
      api.summary().await
    });
    let machines = api_feed(&services, CacheKey::DashboardMachines, |api| async move {
      api.machines().await
    });
    let alerts = api_feed(&services, CacheKey::DashboardAlerts, |api| async move {
      api.alerts().await
    });
    let maintenance = api_feed(&services, CacheKey::DashboardMaintenance, |api| async move {
      api.maintenance().await
    });
    let timeline = Timeline::load(services.cache.clone());

    Self {
      services,
      summary,
      machines,
      alerts,
      maintenance,
      timeline,
      insights: Vec::new(),
      awaiting_insights: true,
      last_refresh: Instant::now(),
      table_state: TableState::default(),
      search: SearchInput::new(),
      export: None,
    }
  }

  fn refresh_all(&mut self) {
    self.summary.refresh();
    self.machines.refresh();
    self.alerts.refresh();
    self.maintenance.refresh();
    self.awaiting_insights = true;
    self.last_refresh = Instant::now();
  }

  fn machine_list(&self) -> &[Machine] {
    self.machines.value().map(Vec::as_slice).unwrap_or(&[])
  }

  fn alert_list(&self) -> &[Alert] {
    self.alerts.value().map(Vec::as_slice).unwrap_or(&[])
  }

  fn task_list(&self) -> &[MaintenanceTask] {
    self.maintenance.value().map(Vec::as_slice).unwrap_or(&[])
  }

  fn visible_machines(&self) -> Vec<&Machine> {
    filter_machines(self.machine_list(), &self.search)
  }

  /// Apply finished fetches. Fresh network results also feed the timeline.
  fn poll_feeds(&mut self) {
    self.summary.poll();
    if self.machines.poll() && self.machines.status() == FeedStatus::Fresh {
      let events = events_from_machines(self.machine_list());
      self.timeline.add(events);
    }
    if self.alerts.poll() && self.alerts.status() == FeedStatus::Fresh {
      let events = events_from_alerts(self.alert_list());
      self.timeline.add(events);
    }
    if self.maintenance.poll() && self.maintenance.status() == FeedStatus::Fresh {
      let events = events_from_maintenance(self.task_list());
      self.timeline.add(events);
    }

    let all_settled = self.summary.is_settled()
      && self.machines.is_settled()
      && self.alerts.is_settled()
      && self.maintenance.is_settled();
    if self.awaiting_insights && all_settled {
      self.insights = compute_insights(
        self.summary.value(),
        self.machine_list(),
        self.alert_list(),
        &self.services.config.dashboard,
      );
      self.awaiting_insights = false;
    }
  }

  fn export_chart(&mut self, path: &'static str, file: &'static str) {
    let api = self.services.api.clone();
    let dest = PathBuf::from(file);
    self.export = Some(Pending::spawn(async move {
      let bytes = api.save_chart(path, &dest).await?;
      Ok(format!("Saved {} ({} bytes)", dest.display(), bytes))
    }));
  }

  fn handle_overlays(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match self.search.handle_key(key) {
      KeyResult::NotHandled => None,
      _ => {
        self.table_state.select(Some(0));
        Some(ViewAction::None)
      }
    }
  }

  fn handle_navigation(&mut self, key: KeyEvent) -> Option<ViewAction> {
    let len = self.visible_machines().len();
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => move_selection(&mut self.table_state, len, 1),
      KeyCode::Char('k') | KeyCode::Up => move_selection(&mut self.table_state, len, -1),
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn handle_actions(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('r') => self.refresh_all(),
      KeyCode::Char('e') => self.export_chart("/chart/summary.png", "dashboard_summary.png"),
      KeyCode::Char('E') => self.export_chart("/chart/status.png", "dashboard_status.png"),
      KeyCode::Enter => {
        let selected = self.table_state.selected()?;
        let (id, name) = self
          .visible_machines()
          .get(selected)
          .map(|m| (m.id, m.name.clone()))?;
        return Some(ViewAction::Push(Box::new(MachineDetailView::new(
          id,
          name,
          self.services.clone(),
        ))));
      }
      KeyCode::Char('q') | KeyCode::Esc => return Some(ViewAction::Pop),
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn render_kpis(&self, frame: &mut Frame, area: Rect) {
    let summary = self.summary.value();
    let total = summary
      .and_then(|s| s.total_machines)
      .unwrap_or(self.machine_list().len() as u64);
    let active_alerts = summary
      .and_then(|s| s.active_alerts)
      .unwrap_or(self.alert_list().len() as u64);
    let forecast = maintenance_forecast(self.task_list(), Utc::now());

    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::DarkGray));
    let value = |text: String| Span::styled(text, Style::default().fg(Color::White).bold());
    let mut line = Line::from(vec![
      label(" Machines: "),
      value(total.to_string()),
      label("   Avg efficiency: "),
      value(fmt_opt(summary.and_then(|s| s.avg_efficiency), "%")),
      label("   Active alerts: "),
      value(active_alerts.to_string()),
      label("   Maintenance due (7d): "),
      value(forecast.upcoming.to_string()),
      label("   Overdue: "),
      Span::styled(
        forecast.overdue.to_string(),
        Style::default()
          .fg(if forecast.overdue > 0 { Color::Red } else { Color::Green })
          .bold(),
      ),
    ]);
    if let Some(at) = self.summary.fetched_at() {
      line.push_span(Span::styled(
        format!("   updated {}s ago", at.elapsed().as_secs()),
        Style::default().fg(Color::DarkGray),
      ));
    }
    frame.render_widget(Paragraph::new(line), area);
  }

  fn render_alerts(&self, frame: &mut Frame, area: Rect) {
    let items: Vec<ListItem> = self
      .alert_list()
      .iter()
      .take(ALERTS_SHOWN)
      .map(|a| {
        let severity = a.severity.clone().unwrap_or_else(|| "-".to_string());
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:<9}", severity), Style::default().fg(severity_color(&severity))),
          Span::raw(truncate(a.machine.as_deref().unwrap_or("-"), 14)),
          Span::styled(
            format!(" {}", a.message.as_deref().unwrap_or("")),
            Style::default().fg(Color::DarkGray),
          ),
        ]))
      })
      .collect();
    frame.render_widget(List::new(items).block(panel(" Alerts ")), area);
  }

  fn render_low_efficiency(&self, frame: &mut Frame, area: Rect) {
    let items: Vec<ListItem> = low_efficiency(self.machine_list(), LOW_EFFICIENCY_SHOWN)
      .into_iter()
      .map(|m| {
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:>7} ", fmt_opt(m.efficiency, "%")), Style::default().fg(Color::Yellow)),
          Span::raw(truncate(&m.name, 24)),
        ]))
      })
      .collect();
    frame.render_widget(List::new(items).block(panel(" Lowest efficiency ")), area);
  }

  fn render_plants(&self, frame: &mut Frame, area: Rect) {
    let items: Vec<ListItem> = plant_summary(self.machine_list())
      .into_iter()
      .map(|(location, avg)| {
        ListItem::new(Line::from(vec![
          Span::raw(format!("{:<16}", truncate(&location, 16))),
          Span::styled(fmt_opt(avg, "%"), Style::default().fg(Color::Cyan)),
        ]))
      })
      .collect();
    frame.render_widget(List::new(items).block(panel(" Plants ")), area);
  }

  fn render_insights(&self, frame: &mut Frame, area: Rect) {
    let lines: Vec<Line> = if self.awaiting_insights && self.insights.is_empty() {
      vec![Line::styled("Waiting for data...", Style::default().fg(Color::DarkGray))]
    } else {
      self
        .insights
        .iter()
        .map(|text| Line::from(format!("* {}", text)))
        .collect()
    };
    frame.render_widget(
      Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(panel(" Insights ")),
      area,
    );
  }

  fn render_timeline(&self, frame: &mut Frame, area: Rect) {
    let items: Vec<ListItem> = self
      .timeline
      .visible()
      .iter()
      .map(|event| {
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<17} ", truncate(&event.t, 16)),
            Style::default().fg(Color::DarkGray),
          ),
          Span::raw(event.text.clone()),
        ]))
      })
      .collect();
    let title = format!(" Timeline ({}) ", self.timeline.len());
    frame.render_widget(List::new(items).block(panel(&title)), area);
  }
}

fn panel(title: &str) -> Block<'_> {
  Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue))
}

impl View for DashboardView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    self
      .handle_overlays(key)
      .or_else(|| self.handle_navigation(key))
      .or_else(|| self.handle_actions(key))
      .unwrap_or(ViewAction::None)
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(1),
        Constraint::Length(11),
        Constraint::Min(8),
        Constraint::Length(9),
      ])
      .split(area);

    self.render_kpis(frame, rows[0]);

    let charts = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
      .split(rows[1]);
    let (series, labels) = self.summary.value().map(trend_series).unwrap_or_default();
    draw_line_chart(frame, charts[0], "Performance trend", &series, &labels);
    let bars = status_bars(self.summary.value(), self.machine_list());
    draw_bar_chart(frame, charts[1], "Status", &bars);

    let middle = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
      .split(rows[2]);
    let visible = self.visible_machines();
    let len = visible.len();
    let title = if self.search.query().is_empty() {
      format!(" Machines ({}) ", len)
    } else {
      format!(" Machines ({}) [/{}] ", len, self.search.query())
    };
    let table = machine_table(&visible, title);
    ensure_valid_selection(&mut self.table_state, len);
    frame.render_stateful_widget(table, middle[0], &mut self.table_state);

    let side = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
      .split(middle[1]);
    self.render_alerts(frame, side[0]);
    self.render_low_efficiency(frame, side[1]);

    let bottom = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([
        Constraint::Percentage(25),
        Constraint::Percentage(35),
        Constraint::Percentage(40),
      ])
      .split(rows[3]);
    self.render_plants(frame, bottom[0]);
    self.render_insights(frame, bottom[1]);
    self.render_timeline(frame, bottom[2]);

    self.search.render_overlay(frame, rows[2]);
  }

  fn breadcrumb_label(&self) -> String {
    "Dashboard".to_string()
  }

  fn data_status(&self) -> Option<FeedStatus> {
    [
      self.summary.status(),
      self.machines.status(),
      self.alerts.status(),
      self.maintenance.status(),
    ]
    .into_iter()
    .max_by_key(|status| rank(*status))
  }

  fn captures_input(&self) -> bool {
    self.search.is_active()
  }

  fn tick(&mut self) -> ViewAction {
    if self.last_refresh.elapsed() >= self.services.config.dashboard.refresh_interval() {
      self.refresh_all();
    }
    self.poll_feeds();

    match Pending::settle(&mut self.export) {
      Some(Ok(message)) => ViewAction::Notify(message),
      Some(Err(error)) => ViewAction::Alert(error),
      None => ViewAction::None,
    }
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("/", "search").with_priority(20),
      Shortcut::new("enter", "details").with_priority(30),
      Shortcut::new("e/E", "export charts").with_priority(40),
      Shortcut::new("r", "refresh").with_priority(50),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::offline::testing::FakeNetwork;
  use crate::services::testing::services;
  use serde_json::json;
  use std::sync::Arc;
  use std::time::Duration;

  fn network() -> Arc<FakeNetwork> {
    let network = Arc::new(FakeNetwork::new());
    network.respond_json(
      "/api/summary",
      json!({"total_machines": 2, "avg_efficiency": 55.0, "active_alerts": 1}),
    );
    network.respond_json(
      "/api/machines",
      json!([
        {"id": 1, "name": "Press 1", "location": "Plant A", "status": "running", "efficiency": 90.0},
        {"id": 2, "name": "Lathe 7", "location": "Plant A", "status": "idle", "efficiency": 40.0}
      ]),
    );
    network.respond_json(
      "/api/alerts?ack=0",
      json!([{"id": 3, "severity": "high", "machine": "Lathe 7", "message": "Vibration"}]),
    );
    network.respond_json("/api/maintenance", json!([]));
    network
  }

  #[tokio::test]
  async fn test_insights_wait_for_all_feeds() {
    let mut view = DashboardView::new(services(network()).await);
    assert!(view.awaiting_insights);
    tokio::time::sleep(Duration::from_millis(30)).await;
    view.tick();

    assert!(!view.awaiting_insights);
    assert_eq!(
      view.insights,
      vec![
        "Machine Lathe 7 low efficiency (40%) - schedule inspection.".to_string(),
        "Average efficiency 55% below target. Consider preventive maintenance.".to_string(),
      ]
    );
    assert_eq!(view.data_status(), Some(FeedStatus::Fresh));
  }

  #[tokio::test]
  async fn test_timeline_grows_on_fresh_data_and_persists() {
    let services = services(network()).await;
    let mut view = DashboardView::new(services.clone());
    tokio::time::sleep(Duration::from_millis(30)).await;
    view.tick();
    // two machines plus one alert, no tasks
    assert_eq!(view.timeline.len(), 3);
    assert_eq!(view.timeline.visible()[0].text, "high: Lathe 7 - Vibration");

    let reopened = DashboardView::new(services);
    assert_eq!(reopened.timeline.len(), 3);
  }

  #[tokio::test]
  async fn test_offline_without_cache_reports_worst_status() {
    let network = Arc::new(FakeNetwork::new());
    network.set_online(false);
    let mut view = DashboardView::new(services(network).await);
    tokio::time::sleep(Duration::from_millis(30)).await;
    view.tick();

    assert_eq!(view.data_status(), Some(FeedStatus::Offline));
    assert_eq!(view.insights, vec!["No critical insights - operations stable.".to_string()]);
    assert_eq!(view.timeline.len(), 0);
  }

  #[test]
  fn test_status_bars_fall_back_to_machine_counts() {
    let machines: Vec<Machine> = serde_json::from_value(json!([
      {"id": 1, "name": "a", "status": "running"},
      {"id": 2, "name": "b", "status": "running"},
      {"id": 3, "name": "c"}
    ]))
    .unwrap();
    assert_eq!(
      status_bars(None, &machines),
      vec![("running".to_string(), 2), ("unknown".to_string(), 1)]
    );
  }
}
