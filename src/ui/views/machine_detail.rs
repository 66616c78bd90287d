use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table};
use std::path::PathBuf;

use super::{api_feed, Pending};
use crate::api::types::MachineDetail;
use crate::api::CacheKey;
use crate::feed::{Feed, FeedStatus};
use crate::services::Services;
use crate::ui::renderfns::{draw_line_chart, fmt_opt, status_color, Series};
use crate::ui::view::{Shortcut, View, ViewAction};

/// Efficiency and uptime in chronological order, with first/last dates as labels
fn performance_series(detail: &MachineDetail) -> (Vec<Series>, Vec<String>) {
  let points: Vec<_> = detail.performance.iter().rev().collect();
  let series_of = |pick: fn(&crate::api::types::PerformancePoint) -> Option<f64>| {
    points
      .iter()
      .enumerate()
      .filter_map(|(i, p)| pick(p).map(|v| (i as f64, v)))
      .collect::<Vec<_>>()
  };

  let series = vec![
    Series::new("efficiency %", series_of(|p| p.efficiency)),
    Series::new("uptime %", series_of(|p| p.uptime)),
  ];
  let labels = match (points.first(), points.last()) {
    (Some(first), Some(last)) if points.len() > 1 => {
      vec![first.metric_date.clone(), last.metric_date.clone()]
    }
    (Some(only), _) => vec![only.metric_date.clone()],
    _ => Vec::new(),
  };
  (series, labels)
}

pub struct MachineDetailView {
  id: u64,
  name: String,
  services: Services,
  feed: Feed<MachineDetail>,
  export: Option<Pending>,
}

impl MachineDetailView {
  pub fn new(id: u64, name: String, services: Services) -> Self {
    let feed = api_feed(&services, CacheKey::Machine(id), move |api| async move {
      api.machine(id).await
    });

    Self {
      id,
      name,
      services,
      feed,
      export: None,
    }
  }

  /// Save the server-rendered trend chart next to the working directory
  fn export_trend(&mut self) {
    let api = self.services.api.clone();
    let path = format!("/chart/trend/{}.png", self.id);
    let dest = PathBuf::from(format!("machine_{}_trend.png", self.id));
    self.export = Some(Pending::spawn(async move {
      let bytes = api.save_chart(&path, &dest).await?;
      Ok(format!("Saved {} ({} bytes)", dest.display(), bytes))
    }));
  }

  fn render_properties(&self, frame: &mut Frame, area: Rect, detail: Option<&MachineDetail>) {
    let block = Block::default()
      .title(format!(" {} ", self.name))
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let Some(detail) = detail else {
      let message = match self.feed.status() {
        FeedStatus::Offline => "Offline and nothing cached. Press 'r' to retry.",
        _ => "Loading...",
      };
      frame.render_widget(
        Paragraph::new(message)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
      return;
    };

    let label = |text: &'static str| Span::styled(format!("{:<11}", text), Style::default().fg(Color::DarkGray));
    let status = detail.status.clone().unwrap_or_else(|| "-".to_string());
    let lines = vec![
      Line::from(vec![label("ID"), Span::raw(self.id.to_string())]),
      Line::from(vec![label("Type"), Span::raw(detail.machine_type.clone().unwrap_or_default())]),
      Line::from(vec![label("Location"), Span::raw(detail.location.clone().unwrap_or_default())]),
      Line::from(vec![
        label("Status"),
        Span::styled(status.clone(), Style::default().fg(status_color(&status))),
      ]),
      Line::from(vec![label("Efficiency"), Span::raw(fmt_opt(detail.efficiency, "%"))]),
      Line::from(vec![label("Last seen"), Span::raw(detail.last_seen.clone().unwrap_or_default())]),
    ];
    frame.render_widget(Paragraph::new(lines).block(block), area);
  }

  fn render_sensors(&self, frame: &mut Frame, area: Rect, detail: Option<&MachineDetail>) {
    let sensors = detail.map(|d| d.sensors.as_slice()).unwrap_or(&[]);
    let rows: Vec<Row> = sensors
      .iter()
      .map(|s| {
        Row::new(vec![
          s.sensor_name.clone(),
          fmt_opt(s.value, ""),
          s.unit.clone().unwrap_or_default(),
          s.recorded_at.clone().unwrap_or_default(),
        ])
      })
      .collect();

    let table = Table::new(
      rows,
      [
        Constraint::Min(12),
        Constraint::Length(10),
        Constraint::Length(6),
        Constraint::Length(20),
      ],
    )
    .header(
      Row::new(vec!["Sensor", "Value", "Unit", "Recorded"])
        .style(Style::default().fg(Color::DarkGray).bold()),
    )
    .block(
      Block::default()
        .title(format!(" Sensors ({}) ", sensors.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue)),
    );
    frame.render_widget(table, area);
  }
}

impl View for MachineDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('r') => self.feed.refresh(),
      KeyCode::Char('e') => self.export_trend(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(8), Constraint::Min(6)])
      .split(area);
    let top = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
      .split(rows[0]);

    let detail = self.feed.value();
    self.render_properties(frame, top[0], detail);
    self.render_sensors(frame, top[1], detail);

    let (series, labels) = detail.map(performance_series).unwrap_or_default();
    draw_line_chart(frame, rows[1], "Performance", &series, &labels);
  }

  fn breadcrumb_label(&self) -> String {
    self.name.clone()
  }

  fn data_status(&self) -> Option<FeedStatus> {
    Some(self.feed.status())
  }

  fn tick(&mut self) -> ViewAction {
    self.feed.poll();
    match Pending::settle(&mut self.export) {
      Some(Ok(message)) => ViewAction::Notify(message),
      Some(Err(error)) => ViewAction::Alert(error),
      None => ViewAction::None,
    }
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("e", "export trend").with_priority(20),
      Shortcut::new("r", "refresh").with_priority(30),
      Shortcut::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::offline::testing::FakeNetwork;
  use crate::offline::Response;
  use crate::services::testing::services;
  use crossterm::event::KeyModifiers;
  use serde_json::json;
  use std::sync::Arc;
  use std::time::Duration;

  #[test]
  fn test_performance_series_is_chronological() {
    let detail: MachineDetail = serde_json::from_value(json!({
      "name": "Press 1",
      "recent_performance": [
        {"metric_date": "2024-05-03", "efficiency": 80.0, "uptime": 95.0},
        {"metric_date": "2024-05-02", "efficiency": 70.0},
        {"metric_date": "2024-05-01", "efficiency": 60.0, "uptime": 90.0}
      ]
    }))
    .unwrap();

    let (series, labels) = performance_series(&detail);
    assert_eq!(series[0].points, vec![(0.0, 60.0), (1.0, 70.0), (2.0, 80.0)]);
    assert_eq!(series[1].points, vec![(0.0, 90.0), (2.0, 95.0)]);
    assert_eq!(labels, vec!["2024-05-01", "2024-05-03"]);
  }

  #[tokio::test]
  async fn test_export_without_chart_raises_alert() {
    let network = Arc::new(FakeNetwork::new());
    network.respond("/chart/trend/9.png", Response::new(404, Vec::new()));
    let mut view = MachineDetailView::new(9, "Mill".to_string(), services(network).await);

    view.handle_key(KeyEvent::new(KeyCode::Char('e'), KeyModifiers::NONE));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(matches!(view.tick(), ViewAction::Alert(message) if message.contains("/chart/trend/9.png")));
  }
}
