use crate::event::{Event, EventHandler};
use crate::services::Services;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::renderfns::{centered_rect, draw_footer, draw_header};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::root_view;
use color_eyre::{eyre::eyre, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use std::io::stdout;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TICK_RATE: Duration = Duration::from_millis(250);
const NOTICE_TTL: Duration = Duration::from_secs(3);

/// Main application state
pub struct App {
  services: Services,

  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` command palette
  command: CommandInput,

  /// Transient footer message and when it was raised
  notice: Option<(String, Instant)>,

  /// Blocking message shown until dismissed
  alert: Option<String>,

  should_quit: bool,
}

impl App {
  pub fn new(services: Services, initial_view: &str) -> Result<Self> {
    let root = root_view(initial_view, &services)
      .ok_or_else(|| eyre!("Unknown view '{}'", initial_view))?;

    Ok(Self {
      services,
      view_stack: vec![root],
      command: CommandInput::new(),
      notice: None,
      alert: None,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(TICK_RATE);
    let result = self.event_loop(&mut terminal, &mut events).await;

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop<B: Backend>(
    &mut self,
    terminal: &mut Terminal<B>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| self.draw(frame))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Resize => {}
      Event::Tick => self.tick(),
    }
  }

  fn tick(&mut self) {
    if self
      .notice
      .as_ref()
      .is_some_and(|(_, at)| at.elapsed() >= NOTICE_TTL)
    {
      self.notice = None;
    }

    if let Some(view) = self.view_stack.last_mut() {
      let action = view.tick();
      self.apply(action);
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    if self.alert.is_some() {
      if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
        self.alert = None;
      }
      return;
    }

    let view_has_focus = self
      .view_stack
      .last()
      .is_some_and(|view| view.captures_input());
    if self.command.is_active() || !view_has_focus {
      match self.command.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(name)) => return self.execute_command(&name),
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    if let Some(view) = self.view_stack.last_mut() {
      let action = view.handle_key(key);
      self.apply(action);
    }
  }

  fn execute_command(&mut self, name: &str) {
    if name == "quit" {
      self.should_quit = true;
      return;
    }

    match root_view(name, &self.services) {
      Some(view) => {
        info!(view = name, "switching view");
        self.view_stack = vec![view];
      }
      None => self.apply(ViewAction::Notify(format!("Unknown command: {}", name))),
    }
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
      ViewAction::Notify(message) => self.notice = Some((message, Instant::now())),
      ViewAction::Alert(message) => {
        warn!(%message, "showing alert");
        self.alert = Some(message);
      }
    }
  }

  fn draw(&mut self, frame: &mut Frame) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(1),
      ])
      .split(frame.area());

    let breadcrumb: Vec<String> = self
      .view_stack
      .iter()
      .map(|view| view.breadcrumb_label())
      .collect();

    if let Some(view) = self.view_stack.last_mut() {
      draw_header(
        frame,
        chunks[0],
        &self.services.config.server.url,
        view.data_status(),
        &view.shortcuts(),
      );
      view.render(frame, chunks[1]);
    }

    let notice = self.notice.as_ref().map(|(message, _)| message.as_str());
    draw_footer(frame, chunks[2], &breadcrumb, notice);

    self.command.render_overlay(frame, chunks[1]);
    if let Some(message) = &self.alert {
      draw_alert(frame, chunks[1], message);
    }
  }
}

fn draw_alert(frame: &mut Frame, area: Rect, message: &str) {
  let rect = centered_rect(area, 60, 7);
  frame.render_widget(Clear, rect);

  let block = Block::default()
    .title(" Error ")
    .title_bottom(Line::from(" Enter to dismiss ").right_aligned())
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Red));
  frame.render_widget(
    Paragraph::new(message)
      .wrap(Wrap { trim: true })
      .block(block),
    rect,
  );
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::offline::testing::FakeNetwork;
  use crate::services::testing::services;
  use std::sync::Arc;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn command(app: &mut App, text: &str) {
    app.handle_key(key(KeyCode::Char(':')));
    for c in text.chars() {
      app.handle_key(key(KeyCode::Char(c)));
    }
    app.handle_key(key(KeyCode::Enter));
  }

  async fn app() -> App {
    App::new(services(Arc::new(FakeNetwork::new())).await, "dashboard").unwrap()
  }

  #[tokio::test]
  async fn test_command_switches_root_view() {
    let mut app = app().await;
    command(&mut app, "al");
    assert_eq!(app.view_stack.len(), 1);
    assert_eq!(app.view_stack[0].breadcrumb_label(), "Alerts");
  }

  #[tokio::test]
  async fn test_unknown_command_notifies() {
    let mut app = app().await;
    command(&mut app, "zzz");
    assert_eq!(
      app.notice.as_ref().map(|(m, _)| m.as_str()),
      Some("Unknown command: zzz")
    );
    assert_eq!(app.view_stack[0].breadcrumb_label(), "Dashboard");
  }

  #[tokio::test]
  async fn test_pop_at_root_quits() {
    let mut app = app().await;
    app.handle_key(key(KeyCode::Char('q')));
    assert!(app.should_quit);
  }

  #[tokio::test]
  async fn test_alert_blocks_keys_until_dismissed() {
    let mut app = app().await;
    app.apply(ViewAction::Alert("Failed to save record: offline".to_string()));

    app.handle_key(key(KeyCode::Char('q')));
    assert!(!app.should_quit);
    app.handle_key(key(KeyCode::Enter));
    assert!(app.alert.is_none());
  }

  #[tokio::test]
  async fn test_unknown_initial_view_is_an_error() {
    let services = services(Arc::new(FakeNetwork::new())).await;
    assert!(App::new(services, "reports").is_err());
  }
}
