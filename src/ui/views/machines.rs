use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, TableState};

use super::{api_feed, MachineDetailView, Pending};
use crate::api::types::{Machine, NewMachine};
use crate::api::CacheKey;
use crate::feed::{Feed, FeedStatus};
use crate::services::Services;
use crate::ui::components::{Form, FormEvent, FormValues, KeyResult, SearchInput};
use crate::ui::renderfns::{fmt_opt, status_color, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::{ensure_valid_selection, move_selection};

/// Machines matching the search box, in feed order
pub(super) fn filter_machines<'a>(machines: &'a [Machine], search: &SearchInput) -> Vec<&'a Machine> {
  machines
    .iter()
    .filter(|m| search.matches(&m.search_text()))
    .collect()
}

/// Machine table shared by the dashboard and the machines view
pub(super) fn machine_table<'a>(machines: &[&Machine], title: String) -> Table<'a> {
  let rows: Vec<Row> = machines
    .iter()
    .map(|m| {
      let status = m.status.clone().unwrap_or_default();
      Row::new(vec![
        Span::styled(m.id.to_string(), Style::default().fg(Color::Cyan)),
        Span::raw(truncate(&m.name, 24)),
        Span::raw(truncate(m.machine_type.as_deref().unwrap_or("-"), 14)),
        Span::raw(truncate(m.location.as_deref().unwrap_or("-"), 16)),
        Span::styled(status.clone(), Style::default().fg(status_color(&status))),
        Span::raw(fmt_opt(m.efficiency, "%")),
      ])
    })
    .collect();

  Table::new(
    rows,
    [
      Constraint::Length(5),
      Constraint::Min(12),
      Constraint::Length(14),
      Constraint::Length(16),
      Constraint::Length(12),
      Constraint::Length(7),
    ],
  )
  .header(
    Row::new(vec!["ID", "Name", "Type", "Location", "Status", "Eff."])
      .style(Style::default().fg(Color::DarkGray).bold()),
  )
  .block(
    Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue)),
  )
  .row_highlight_style(
    Style::default()
      .bg(Color::DarkGray)
      .add_modifier(Modifier::BOLD),
  )
  .highlight_symbol("> ")
}

pub struct MachinesView {
  services: Services,
  feed: Feed<Vec<Machine>>,
  table_state: TableState,
  search: SearchInput,
  form: Option<Form>,
  pending: Option<Pending>,
}

impl MachinesView {
  pub fn new(services: Services) -> Self {
    let feed = api_feed(&services, CacheKey::Machines, |api| async move {
      api.machines().await
    });

    Self {
      services,
      feed,
      table_state: TableState::default(),
      search: SearchInput::new(),
      form: None,
      pending: None,
    }
  }

  fn visible(&self) -> Vec<&Machine> {
    let machines = self.feed.value().map(Vec::as_slice).unwrap_or(&[]);
    filter_machines(machines, &self.search)
  }

  fn add_machine_form() -> Form {
    Form::new("Add machine")
      .required("Name")
      .required("Type")
      .required("Location")
      .text("Rated capacity", "")
  }

  fn submit_machine(&mut self, values: FormValues) -> ViewAction {
    let rated_capacity = match values.optional("Rated capacity") {
      Some(raw) => match raw.parse::<f64>() {
        Ok(capacity) => Some(capacity),
        Err(_) => return ViewAction::Notify(format!("Rated capacity '{}' is not a number", raw)),
      },
      None => None,
    };
    let machine = NewMachine {
      name: values.get("Name").to_string(),
      machine_type: values.get("Type").to_string(),
      location: values.get("Location").to_string(),
      rated_capacity,
    };

    let api = self.services.api.clone();
    self.pending = Some(Pending::spawn(async move {
      api.create_machine(&machine).await?;
      Ok(format!("Added machine {}", machine.name))
    }));
    ViewAction::None
  }

  fn handle_overlays(&mut self, key: KeyEvent) -> Option<ViewAction> {
    if let Some(form) = self.form.as_mut() {
      return Some(match form.handle_key(key) {
        KeyResult::Event(FormEvent::Submitted(values)) => {
          self.form = None;
          self.submit_machine(values)
        }
        KeyResult::Event(FormEvent::Cancelled) => {
          self.form = None;
          ViewAction::None
        }
        KeyResult::Handled | KeyResult::NotHandled => ViewAction::None,
      });
    }

    match self.search.handle_key(key) {
      KeyResult::NotHandled => None,
      _ => {
        self.table_state.select(Some(0));
        Some(ViewAction::None)
      }
    }
  }

  fn handle_navigation(&mut self, key: KeyEvent) -> Option<ViewAction> {
    let len = self.visible().len();
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => move_selection(&mut self.table_state, len, 1),
      KeyCode::Char('k') | KeyCode::Up => move_selection(&mut self.table_state, len, -1),
      KeyCode::Char('g') | KeyCode::Home => move_selection(&mut self.table_state, len, -(len as isize)),
      KeyCode::Char('G') | KeyCode::End => move_selection(&mut self.table_state, len, len as isize),
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn handle_actions(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('r') => {
        self.feed.refresh();
        Some(ViewAction::None)
      }
      KeyCode::Char('a') => {
        self.form = Some(Self::add_machine_form());
        Some(ViewAction::None)
      }
      KeyCode::Enter => {
        let selected = self.table_state.selected()?;
        let machine = self.visible().get(selected).map(|m| (m.id, m.name.clone()))?;
        Some(ViewAction::Push(Box::new(MachineDetailView::new(
          machine.0,
          machine.1,
          self.services.clone(),
        ))))
      }
      KeyCode::Char('q') | KeyCode::Esc => Some(ViewAction::Pop),
      _ => None,
    }
  }
}

impl View for MachinesView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    self
      .handle_overlays(key)
      .or_else(|| self.handle_navigation(key))
      .or_else(|| self.handle_actions(key))
      .unwrap_or(ViewAction::None)
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let visible = self.visible();
    let len = visible.len();

    let title = match self.feed.status() {
      FeedStatus::Loading => " Machines (loading...) ".to_string(),
      _ if self.search.query().is_empty() => format!(" Machines ({}) ", len),
      _ => format!(" Machines ({}) [/{}] ", len, self.search.query()),
    };

    if len == 0 && !self.feed.is_loading() {
      let message = match self.feed.status() {
        FeedStatus::Offline => "Offline and nothing cached. Press 'r' to retry.",
        _ if !self.search.query().is_empty() => "No machines match the search.",
        _ => "No machines found.",
      };
      let block = Block::default()
        .title(title)
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));
      frame.render_widget(
        Paragraph::new(message)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
    } else {
      let table = machine_table(&visible, title);
      ensure_valid_selection(&mut self.table_state, len);
      frame.render_stateful_widget(table, area, &mut self.table_state);
    }

    self.search.render_overlay(frame, area);
    if let Some(form) = &self.form {
      form.render(frame, area);
    }
  }

  fn breadcrumb_label(&self) -> String {
    "Machines".to_string()
  }

  fn data_status(&self) -> Option<FeedStatus> {
    Some(self.feed.status())
  }

  fn captures_input(&self) -> bool {
    self.form.is_some() || self.search.is_active()
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
      Shortcut::new("/", "search").with_priority(20),
      Shortcut::new("enter", "details").with_priority(30),
      Shortcut::new("a", "add").with_priority(40),
      Shortcut::new("r", "refresh").with_priority(50),
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

  fn network() -> Arc<FakeNetwork> {
    let network = Arc::new(FakeNetwork::new());
    network.respond_json(
      "/api/machines",
      json!([
        {"id": 1, "name": "Press 1", "type": "press", "location": "Plant A", "status": "running"},
        {"id": 2, "name": "Lathe 7", "type": "cnc", "location": "Plant B", "status": "idle"}
      ]),
    );
    network
  }

  #[tokio::test]
  async fn test_search_filters_and_enter_opens_detail() {
    let mut view = MachinesView::new(services(network()).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    view.tick();
    assert_eq!(view.visible().len(), 2);

    view.handle_key(key(KeyCode::Char('/')));
    for c in "lathe".chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
    view.handle_key(key(KeyCode::Enter));
    assert_eq!(view.visible().len(), 1);
    assert!(!view.captures_input());

    assert!(matches!(
      view.handle_key(key(KeyCode::Enter)),
      ViewAction::Push(_)
    ));
  }

  #[tokio::test]
  async fn test_add_machine_posts_and_notifies() {
    let network = network();
    network.respond_json("/api/machines", json!({"success": true}));
    let mut view = MachinesView::new(services(network.clone()).await);

    view.handle_key(key(KeyCode::Char('a')));
    assert!(view.captures_input());
    for (i, text) in ["Mill 3", "mill", "Plant C"].iter().enumerate() {
      if i > 0 {
        view.handle_key(key(KeyCode::Tab));
      }
      for c in text.chars() {
        view.handle_key(key(KeyCode::Char(c)));
      }
    }
    view.handle_key(key(KeyCode::Enter));
    tokio::time::sleep(Duration::from_millis(20)).await;

    match view.tick() {
      ViewAction::Notify(message) => assert_eq!(message, "Added machine Mill 3"),
      _ => panic!("expected a notice"),
    }
    let post = network
      .requests()
      .into_iter()
      .find(|r| r.method == reqwest::Method::POST)
      .unwrap();
    let body: serde_json::Value = serde_json::from_slice(post.body.as_deref().unwrap()).unwrap();
    assert_eq!(body["type"], "mill");
    assert_eq!(body["rated_capacity"], serde_json::Value::Null);
  }

  #[tokio::test]
  async fn test_failed_add_raises_alert() {
    let network = Arc::new(FakeNetwork::new());
    network.set_online(false);
    let mut view = MachinesView::new(services(network).await);

    view.handle_key(key(KeyCode::Char('a')));
    for c in "X".chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
    view.handle_key(key(KeyCode::Tab));
    view.handle_key(key(KeyCode::Char('t')));
    view.handle_key(key(KeyCode::Tab));
    view.handle_key(key(KeyCode::Char('p')));
    view.handle_key(key(KeyCode::Enter));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(matches!(view.tick(), ViewAction::Alert(message) if message.contains("add machine")));
  }
}
