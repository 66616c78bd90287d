use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, TableState};

use super::{api_feed, Pending};
use crate::api::types::{MaintenanceTask, NewTask};
use crate::api::CacheKey;
use crate::feed::{Feed, FeedStatus};
use crate::insights::{maintenance_forecast, parse_when};
use crate::services::Services;
use crate::ui::components::{Form, FormEvent, FormValues, KeyResult};
use crate::ui::renderfns::{status_color, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::{ensure_valid_selection, move_selection};

/// Turn the create-task form into a request body.
fn new_task(values: &FormValues) -> Result<NewTask, String> {
  let machine_id = match values.optional("Machine ID") {
    Some(raw) => Some(
      raw
        .parse::<u64>()
        .map_err(|_| format!("Machine ID '{}' is not a number", raw))?,
    ),
    None => None,
  };
  let scheduled_date = values.optional("Scheduled");
  if let Some(date) = &scheduled_date {
    if parse_when(date).is_none() {
      return Err(format!("Scheduled date '{}' is not a date (YYYY-MM-DD)", date));
    }
  }
  Ok(NewTask::new(
    machine_id,
    values.get("Description"),
    values.get("Technician"),
    scheduled_date,
  ))
}

pub struct MaintenanceView {
  services: Services,
  feed: Feed<Vec<MaintenanceTask>>,
  table_state: TableState,
  form: Option<Form>,
  pending: Option<Pending>,
}

impl MaintenanceView {
  pub fn new(services: Services) -> Self {
    let feed = api_feed(&services, CacheKey::Maintenance, |api| async move {
      api.maintenance().await
    });
    Self {
      services,
      feed,
      table_state: TableState::default(),
      form: None,
      pending: None,
    }
  }

  fn tasks(&self) -> &[MaintenanceTask] {
    self.feed.value().map(Vec::as_slice).unwrap_or(&[])
  }

  fn task_form() -> Form {
    Form::new("New maintenance task")
      .text("Machine ID", "")
      .required("Description")
      .required("Technician")
      .text("Scheduled", Utc::now().format("%Y-%m-%d").to_string())
  }

  fn submit_task(&mut self, values: FormValues) -> ViewAction {
    let task = match new_task(&values) {
      Ok(task) => task,
      Err(message) => return ViewAction::Notify(message),
    };
    let api = self.services.api.clone();
    self.pending = Some(Pending::spawn(async move {
      api.create_task(&task).await?;
      Ok("Task created".to_string())
    }));
    ViewAction::None
  }

  fn handle_form(&mut self, key: KeyEvent) -> Option<ViewAction> {
    let form = self.form.as_mut()?;
    Some(match form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted(values)) => {
        self.form = None;
        self.submit_task(values)
      }
      KeyResult::Event(FormEvent::Cancelled) => {
        self.form = None;
        ViewAction::None
      }
      KeyResult::Handled | KeyResult::NotHandled => ViewAction::None,
    })
  }

  fn render_forecast(&self, frame: &mut Frame, area: Rect) {
    let forecast = maintenance_forecast(self.tasks(), Utc::now());
    let line = Line::from(vec![
      Span::styled(" Upcoming (7 days): ", Style::default().fg(Color::DarkGray)),
      Span::styled(forecast.upcoming.to_string(), Style::default().fg(Color::Yellow).bold()),
      Span::styled("   Overdue: ", Style::default().fg(Color::DarkGray)),
      Span::styled(
        forecast.overdue.to_string(),
        Style::default()
          .fg(if forecast.overdue > 0 { Color::Red } else { Color::Green })
          .bold(),
      ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
  }
}

impl View for MaintenanceView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if let Some(action) = self.handle_form(key) {
      return action;
    }
    let len = self.tasks().len();
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => move_selection(&mut self.table_state, len, 1),
      KeyCode::Char('k') | KeyCode::Up => move_selection(&mut self.table_state, len, -1),
      KeyCode::Char('n') => self.form = Some(Self::task_form()),
      KeyCode::Char('r') => self.feed.refresh(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(1), Constraint::Min(3)])
      .split(area);
    self.render_forecast(frame, chunks[0]);

    let len = self.tasks().len();
    let title = match self.feed.status() {
      FeedStatus::Loading => " Maintenance (loading...) ".to_string(),
      _ => format!(" Maintenance ({}) ", len),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 && !self.feed.is_loading() {
      let message = match self.feed.status() {
        FeedStatus::Offline => "Offline and nothing cached. Press 'r' to retry.",
        _ => "No maintenance tasks. Press 'n' to create one.",
      };
      frame.render_widget(
        Paragraph::new(message)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        chunks[1],
      );
    } else {
      let rows: Vec<Row> = self
        .tasks()
        .iter()
        .map(|t| {
          let status = t.status.clone().unwrap_or_else(|| "-".to_string());
          Row::new(vec![
            Span::styled(
              t.id.map(|id| id.to_string()).unwrap_or_default(),
              Style::default().fg(Color::Cyan),
            ),
            Span::raw(truncate(t.machine.as_deref().unwrap_or("-"), 18)),
            Span::raw(t.description.clone().unwrap_or_default()),
            Span::raw(truncate(t.technician.as_deref().unwrap_or("-"), 14)),
            Span::raw(t.priority.clone().unwrap_or_default()),
            Span::styled(status.clone(), Style::default().fg(status_color(&status))),
            Span::raw(t.scheduled_date.clone().unwrap_or_default()),
          ])
        })
        .collect();

      let table = Table::new(
        rows,
        [
          Constraint::Length(5),
          Constraint::Length(18),
          Constraint::Min(20),
          Constraint::Length(14),
          Constraint::Length(8),
          Constraint::Length(12),
          Constraint::Length(12),
        ],
      )
      .header(
        Row::new(vec![
          "ID",
          "Machine",
          "Description",
          "Technician",
          "Priority",
          "Status",
          "Scheduled",
        ])
        .style(Style::default().fg(Color::DarkGray).bold()),
      )
      .block(block)
      .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
      .highlight_symbol("> ");

      ensure_valid_selection(&mut self.table_state, len);
      frame.render_stateful_widget(table, chunks[1], &mut self.table_state);
    }

    if let Some(form) = &self.form {
      form.render(frame, area);
    }
  }

  fn breadcrumb_label(&self) -> String {
    "Maintenance".to_string()
  }

  fn data_status(&self) -> Option<FeedStatus> {
    Some(self.feed.status())
  }

  fn captures_input(&self) -> bool {
    self.form.is_some()
  }

  fn tick(&mut self) -> ViewAction {
    self.feed.poll();
    match Pending::settle(&mut self.pending) {
      Some(Ok(message)) => {
        self.feed.refresh();
        ViewAction::Notify(message)
      }
      Some(Err(error)) => ViewAction::Alert(error),
      None => ViewAction::None,
    }
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("n", "new task").with_priority(20),
      Shortcut::new("r", "refresh").with_priority(30),
      Shortcut::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::offline::testing::FakeNetwork;
  use crate::services::testing::services;
  use crossterm::event::KeyModifiers;
  use serde_json::json;
  use std::sync::Arc;
  use std::time::Duration;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_text(view: &mut MaintenanceView, text: &str) {
    for c in text.chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
  }

  #[tokio::test]
  async fn test_create_task_posts_medium_priority() {
    let network = Arc::new(FakeNetwork::new());
    network.respond_json("/api/maintenance", json!({"ok": true}));
    let mut view = MaintenanceView::new(services(network.clone()).await);

    view.handle_key(key(KeyCode::Char('n')));
    type_text(&mut view, "3");
    view.handle_key(key(KeyCode::Tab));
    type_text(&mut view, "Replace belt");
    view.handle_key(key(KeyCode::Tab));
    type_text(&mut view, "Ana");
    view.handle_key(key(KeyCode::Enter));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(matches!(view.tick(), ViewAction::Notify(message) if message == "Task created"));
    let post = network
      .requests()
      .into_iter()
      .find(|r| r.method == reqwest::Method::POST)
      .unwrap();
    let body: serde_json::Value = serde_json::from_slice(post.body.as_deref().unwrap()).unwrap();
    assert_eq!(body["machine_id"], 3);
    assert_eq!(body["priority"], "medium");
    assert_eq!(body["technician"], "Ana");
  }

  #[test]
  fn test_new_task_validation() {
    let mut form = MaintenanceView::task_form();
    for c in "x".chars() {
      form.handle_key(key(KeyCode::Char(c)));
    }
    form.handle_key(key(KeyCode::Tab));
    form.handle_key(key(KeyCode::Char('d')));
    form.handle_key(key(KeyCode::Tab));
    form.handle_key(key(KeyCode::Char('t')));
    let KeyResult::Event(FormEvent::Submitted(values)) = form.handle_key(key(KeyCode::Enter)) else {
      panic!("form did not submit");
    };
    assert_eq!(new_task(&values).unwrap_err(), "Machine ID 'x' is not a number");
  }
}
