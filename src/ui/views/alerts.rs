use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, TableState};

use super::{api_feed, Pending};
use crate::api::types::Alert;
use crate::api::CacheKey;
use crate::feed::{Feed, FeedStatus};
use crate::services::Services;
use crate::ui::renderfns::{severity_color, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::{ensure_valid_selection, move_selection};

pub struct AlertsView {
  services: Services,
  feed: Feed<Vec<Alert>>,
  table_state: TableState,
  pending: Option<Pending>,
}

impl AlertsView {
  pub fn new(services: Services) -> Self {
    let feed = api_feed(&services, CacheKey::Alerts, |api| async move { api.alerts().await });
    Self {
      services,
      feed,
      table_state: TableState::default(),
      pending: None,
    }
  }

  fn alerts(&self) -> &[Alert] {
    self.feed.value().map(Vec::as_slice).unwrap_or(&[])
  }

  fn acknowledge_selected(&mut self) -> ViewAction {
    if self.pending.is_some() {
      return ViewAction::Notify("Still working on the last request".to_string());
    }
    let Some(alert) = self
      .table_state
      .selected()
      .and_then(|i| self.alerts().get(i))
    else {
      return ViewAction::None;
    };

    let id = alert.id;
    let api = self.services.api.clone();
    self.pending = Some(Pending::spawn(async move {
      api.ack_alert(id).await?;
      Ok(format!("Alert {} acknowledged", id))
    }));
    ViewAction::None
  }
}

impl View for AlertsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    let len = self.alerts().len();
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => move_selection(&mut self.table_state, len, 1),
      KeyCode::Char('k') | KeyCode::Up => move_selection(&mut self.table_state, len, -1),
      KeyCode::Char('a') | KeyCode::Enter => return self.acknowledge_selected(),
      KeyCode::Char('r') => self.feed.refresh(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.alerts().len();
    let title = match self.feed.status() {
      FeedStatus::Loading => " Alerts (loading...) ".to_string(),
      _ => format!(" Alerts ({}) ", len),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 && !self.feed.is_loading() {
      let message = match self.feed.status() {
        FeedStatus::Offline => "Offline and nothing cached. Press 'r' to retry.",
        _ => "No unacknowledged alerts.",
      };
      frame.render_widget(
        Paragraph::new(message)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
      return;
    }

    let rows: Vec<Row> = self
      .alerts()
      .iter()
      .map(|a| {
        let severity = a.severity.clone().unwrap_or_else(|| "-".to_string());
        Row::new(vec![
          Span::styled(a.id.to_string(), Style::default().fg(Color::Cyan)),
          Span::styled(severity.clone(), Style::default().fg(severity_color(&severity))),
          Span::raw(truncate(a.machine.as_deref().unwrap_or("-"), 20)),
          Span::raw(a.message.clone().unwrap_or_default()),
          Span::styled(
            a.raised_at.clone().unwrap_or_default(),
            Style::default().fg(Color::DarkGray),
          ),
        ])
      })
      .collect();

    let table = Table::new(
      rows,
      [
        Constraint::Length(6),
        Constraint::Length(10),
        Constraint::Length(20),
        Constraint::Min(20),
        Constraint::Length(20),
      ],
    )
    .header(
      Row::new(vec!["ID", "Severity", "Machine", "Message", "Raised"])
        .style(Style::default().fg(Color::DarkGray).bold()),
    )
    .block(block)
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("> ");

    ensure_valid_selection(&mut self.table_state, len);
    frame.render_stateful_widget(table, area, &mut self.table_state);
  }

  fn breadcrumb_label(&self) -> String {
    "Alerts".to_string()
  }

  fn data_status(&self) -> Option<FeedStatus> {
    Some(self.feed.status())
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
      Shortcut::new("a", "acknowledge").with_priority(20),
      Shortcut::new("r", "refresh").with_priority(30),
      Shortcut::new("q", "back").with_priority(90),
    ]
  }
}
