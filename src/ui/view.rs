use crossterm::event::KeyEvent;
use ratatui::prelude::*;

use crate::feed::FeedStatus;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone)]
pub struct Shortcut {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl Shortcut {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Actions that a view can request in response to input or async results
pub enum ViewAction {
  /// No action needed
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
  /// Show a transient message in the footer
  Notify(String),
  /// Show a blocking message until dismissed
  Alert(String),
}

/// Trait for view behavior
///
/// Views own their state (feeds, selection, forms) and return actions for the
/// App to execute: App → View → Components.
///
/// Data is loaded through `Feed<T>`/`Query<T>` and polled in `tick()`, which
/// may also report the outcome of a finished mutation.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Get the breadcrumb label for this view
  fn breadcrumb_label(&self) -> String;

  /// Where the data on screen came from, for the header
  fn data_status(&self) -> Option<FeedStatus> {
    None
  }

  /// Whether a text field currently has focus (so `:` is typed, not a command)
  fn captures_input(&self) -> bool {
    false
  }

  /// Called on each tick to poll async work
  fn tick(&mut self) -> ViewAction {
    ViewAction::None
  }

  /// Keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("r", "refresh").with_priority(20),
      Shortcut::new("q", "back").with_priority(90),
    ]
  }
}
