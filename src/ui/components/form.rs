use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::ui::renderfns::centered_rect;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

#[derive(Debug, Clone)]
enum FieldKind {
  Text { input: TextInput, required: bool },
  Choice { options: Vec<String>, selected: usize },
}

#[derive(Debug, Clone)]
struct Field {
  label: &'static str,
  kind: FieldKind,
}

impl Field {
  fn value(&self) -> &str {
    match &self.kind {
      FieldKind::Text { input, .. } => input.value().trim(),
      FieldKind::Choice { options, selected } => {
        options.get(*selected).map(String::as_str).unwrap_or("")
      }
    }
  }
}

/// Submitted form values, looked up by field label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormValues(Vec<(&'static str, String)>);

impl FormValues {
  /// Trimmed value of `label`, empty when the field does not exist
  pub fn get(&self, label: &str) -> &str {
    self
      .0
      .iter()
      .find(|(l, _)| *l == label)
      .map(|(_, v)| v.as_str())
      .unwrap_or("")
  }

  /// `None` for an empty value
  pub fn optional(&self, label: &str) -> Option<String> {
    let value = self.get(label);
    (!value.is_empty()).then(|| value.to_string())
  }
}

impl FromIterator<(&'static str, String)> for FormValues {
  fn from_iter<I: IntoIterator<Item = (&'static str, String)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  Submitted(FormValues),
  Cancelled,
}

/// Modal form of text and choice fields.
///
/// Tab/Up/Down move between fields, Left/Right cycle a choice, Enter submits
/// once every required field is filled, Esc cancels.
#[derive(Debug, Clone)]
pub struct Form {
  title: String,
  fields: Vec<Field>,
  focused: usize,
  error: Option<String>,
}

impl Form {
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      fields: Vec::new(),
      focused: 0,
      error: None,
    }
  }

  pub fn text(self, label: &'static str, initial: impl Into<String>) -> Self {
    self.push(label, TextInput::with_value(initial), false)
  }

  pub fn required(self, label: &'static str) -> Self {
    self.push(label, TextInput::new(), true)
  }

  fn push(mut self, label: &'static str, input: TextInput, required: bool) -> Self {
    self.fields.push(Field {
      label,
      kind: FieldKind::Text { input, required },
    });
    self
  }

  pub fn choice<I, S>(mut self, label: &'static str, options: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.fields.push(Field {
      label,
      kind: FieldKind::Choice {
        options: options.into_iter().map(Into::into).collect(),
        selected: 0,
      },
    });
    self
  }

  fn values(&self) -> FormValues {
    self
      .fields
      .iter()
      .map(|f| (f.label, f.value().to_string()))
      .collect()
  }

  fn missing(&self) -> Option<&'static str> {
    self.fields.iter().find_map(|f| match &f.kind {
      FieldKind::Text { input, required: true } if input.value().trim().is_empty() => Some(f.label),
      _ => None,
    })
  }

  fn move_focus(&mut self, forward: bool) {
    let n = self.fields.len().max(1);
    self.focused = if forward {
      (self.focused + 1) % n
    } else {
      (self.focused + n - 1) % n
    };
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    match key.code {
      KeyCode::Esc => return KeyResult::Event(FormEvent::Cancelled),
      KeyCode::Enter => {
        if let Some(label) = self.missing() {
          self.error = Some(format!("{} is required", label));
          return KeyResult::Handled;
        }
        return KeyResult::Event(FormEvent::Submitted(self.values()));
      }
      KeyCode::Tab | KeyCode::Down => {
        self.move_focus(true);
        return KeyResult::Handled;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.move_focus(false);
        return KeyResult::Handled;
      }
      _ => {}
    }

    let Some(field) = self.fields.get_mut(self.focused) else {
      return KeyResult::Handled;
    };
    match &mut field.kind {
      FieldKind::Text { input, .. } => {
        if input.handle_key(key) == InputResult::Consumed {
          self.error = None;
        }
      }
      FieldKind::Choice { options, selected } if !options.is_empty() => match key.code {
        KeyCode::Left | KeyCode::Char('h') => {
          *selected = (*selected + options.len() - 1) % options.len();
        }
        KeyCode::Right | KeyCode::Char('l') | KeyCode::Char(' ') => {
          *selected = (*selected + 1) % options.len();
        }
        _ => {}
      },
      FieldKind::Choice { .. } => {}
    }
    KeyResult::Handled
  }

  pub fn render(&self, frame: &mut Frame, area: Rect) {
    let label_width = self.fields.iter().map(|f| f.label.len()).max().unwrap_or(0);
    let height = self.fields.len() as u16 + 4;
    let overlay_area = centered_rect(area, 64, height);
    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(format!(" {} ", self.title));
    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    let mut lines: Vec<Line> = self
      .fields
      .iter()
      .enumerate()
      .map(|(i, field)| {
        let focused = i == self.focused;
        let label_style = if focused {
          Style::default().fg(Color::Yellow).bold()
        } else {
          Style::default().fg(Color::DarkGray)
        };
        let value = match &field.kind {
          FieldKind::Text { input, .. } if focused => format!("{}_", input.value()),
          FieldKind::Text { input, .. } => input.value().to_string(),
          FieldKind::Choice { .. } => format!("< {} >", field.value()),
        };
        Line::from(vec![
          Span::styled(format!("{:>width$}: ", field.label, width = label_width), label_style),
          Span::raw(value),
        ])
      })
      .collect();

    lines.push(Line::raw(""));
    lines.push(match &self.error {
      Some(error) => Line::styled(error.clone(), Style::default().fg(Color::Red)),
      None => Line::styled(
        "tab: next  ←/→: choose  enter: submit  esc: cancel",
        Style::default().fg(Color::DarkGray),
      ),
    });

    frame.render_widget(Paragraph::new(lines), inner);
  }
}
