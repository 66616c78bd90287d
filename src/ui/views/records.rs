use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, TableState};
use serde_json::Value;
use std::path::PathBuf;

use super::Pending;
use crate::api::types::{Record, RecordTable};
use crate::api::ImcsClient;
use crate::query::{Query, QueryState};
use crate::services::Services;
use crate::ui::components::{Form, FormEvent, FormValues, KeyResult};
use crate::ui::renderfns::truncate;
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::{ensure_valid_selection, move_selection};

fn records_query(api: ImcsClient, table: RecordTable) -> Query<Vec<Record>> {
  let mut query = Query::new(move || {
    let api = api.clone();
    async move {
      api
        .records(table)
        .await
        .ok_or_else(|| format!("Could not load {} records", table.as_str()))
    }
  });
  query.fetch();
  query
}

/// Display form of a JSON cell: strings unquoted, null empty.
fn cell_text(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn record_id(record: &Record) -> Option<String> {
  record.get("id").map(cell_text).filter(|id| !id.is_empty())
}

/// Quoted CSV of the table: a header line, then one line per record. Every
/// field is trimmed and wrapped in quotes, embedded quotes doubled.
fn records_csv(columns: &[String], records: &[Record]) -> String {
  let quote = |text: &str| format!("\"{}\"", text.trim().replace('"', "\"\""));
  let header = columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(",");
  let lines = records.iter().map(|record| {
    columns
      .iter()
      .map(|c| quote(&record.get(c).map(cell_text).unwrap_or_default()))
      .collect::<Vec<_>>()
      .join(",")
  });
  std::iter::once(header).chain(lines).collect::<Vec<_>>().join("\n")
}

/// Edited fields keep the JSON type of the original value when they still parse as it.
fn edited_record(original: &Record, fields: &[&'static str], values: &FormValues) -> Record {
  fields
    .iter()
    .map(|field| {
      let text = values.get(field);
      let value = match original.get(*field) {
        Some(Value::Number(_)) => text
          .parse::<f64>()
          .ok()
          .and_then(serde_json::Number::from_f64)
          .map(Value::Number)
          .unwrap_or_else(|| Value::String(text.to_string())),
        _ => Value::String(text.to_string()),
      };
      (field.to_string(), value)
    })
    .collect()
}

/// Bulk tables under `/api/data/`, with inline edit and delete.
pub struct RecordsView {
  services: Services,
  table: RecordTable,
  records: Query<Vec<Record>>,
  table_state: TableState,
  form: Option<Form>,
  /// Record id awaiting a second `d`
  confirm_delete: Option<String>,
  pending: Option<Pending>,
  export: Option<Pending>,
}

impl RecordsView {
  pub fn new(services: Services) -> Self {
    let table = RecordTable::Machines;
    let records = records_query(services.api.clone(), table);
    Self {
      services,
      table,
      records,
      table_state: TableState::default(),
      form: None,
      confirm_delete: None,
      pending: None,
      export: None,
    }
  }

  fn rows(&self) -> &[Record] {
    self.records.data().map(Vec::as_slice).unwrap_or(&[])
  }

  fn selected(&self) -> Option<&Record> {
    self.table_state.selected().and_then(|i| self.rows().get(i))
  }

  /// Column names in the order the server sent them, first record first.
  fn columns(&self) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in self.rows() {
      for key in record.keys() {
        if !columns.contains(key) {
          columns.push(key.clone());
        }
      }
    }
    columns
  }

  fn toggle_table(&mut self) {
    self.table = match self.table {
      RecordTable::Machines => RecordTable::Sensors,
      RecordTable::Sensors => RecordTable::Machines,
    };
    self.records = records_query(self.services.api.clone(), self.table);
    self.table_state.select(None);
    self.confirm_delete = None;
  }

  fn export_csv(&mut self) -> ViewAction {
    if self.rows().is_empty() {
      return ViewAction::Notify(format!("No {} records to export", self.table.as_str()));
    }
    let csv = records_csv(&self.columns(), self.rows());
    let dest = PathBuf::from(format!("{}.csv", self.table.as_str()));
    self.export = Some(Pending::spawn(async move {
      tokio::fs::write(&dest, csv.as_bytes())
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to write {}: {}", dest.display(), e))?;
      Ok(format!("Saved {}", dest.display()))
    }));
    ViewAction::None
  }

  fn edit_form(&self) -> Option<Form> {
    let record = self.selected()?;
    let id = record_id(record)?;
    let form = self
      .table
      .editable_fields()
      .iter()
      .fold(Form::new(format!("Edit {} {}", self.table.as_str(), id)), |form, &field| {
        form.text(field, record.get(field).map(cell_text).unwrap_or_default())
      });
    Some(form)
  }

  fn save(&mut self, values: FormValues) -> ViewAction {
    let Some(original) = self.selected() else {
      return ViewAction::None;
    };
    let Some(id) = record_id(original) else {
      return ViewAction::None;
    };
    let record = edited_record(original, self.table.editable_fields(), &values);

    let api = self.services.api.clone();
    let table = self.table;
    self.pending = Some(Pending::spawn(async move {
      api.update_record(table, &id, &record).await?;
      Ok(format!("Saved record {}", id))
    }));
    ViewAction::None
  }

  fn delete_selected(&mut self) -> ViewAction {
    let Some(id) = self.selected().and_then(record_id) else {
      return ViewAction::None;
    };
    if self.confirm_delete.as_deref() != Some(id.as_str()) {
      let message = format!("Press d again to delete record {}", id);
      self.confirm_delete = Some(id);
      return ViewAction::Notify(message);
    }

    self.confirm_delete = None;
    let api = self.services.api.clone();
    let table = self.table;
    self.pending = Some(Pending::spawn(async move {
      api.delete_record(table, &id).await?;
      Ok(format!("Deleted record {}", id))
    }));
    ViewAction::None
  }

  fn handle_form(&mut self, key: KeyEvent) -> Option<ViewAction> {
    let form = self.form.as_mut()?;
    Some(match form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted(values)) => {
        self.form = None;
        self.save(values)
      }
      KeyResult::Event(FormEvent::Cancelled) => {
        self.form = None;
        ViewAction::None
      }
      KeyResult::Handled | KeyResult::NotHandled => ViewAction::None,
    })
  }
}

impl View for RecordsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if let Some(action) = self.handle_form(key) {
      return action;
    }
    if key.code != KeyCode::Char('d') {
      self.confirm_delete = None;
    }

    let len = self.rows().len();
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => move_selection(&mut self.table_state, len, 1),
      KeyCode::Char('k') | KeyCode::Up => move_selection(&mut self.table_state, len, -1),
      KeyCode::Tab | KeyCode::Char('t') => self.toggle_table(),
      KeyCode::Char('e') | KeyCode::Enter => self.form = self.edit_form(),
      KeyCode::Char('d') => return self.delete_selected(),
      KeyCode::Char('x') => return self.export_csv(),
      KeyCode::Char('r') => self.records.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.rows().len();
    let title = match self.records.state() {
      QueryState::Loading => format!(" {} (loading...) ", self.table.as_str()),
      _ => format!(" {} ({}) ", self.table.as_str(), len),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if let Some(error) = self.records.error() {
      frame.render_widget(
        Paragraph::new(format!("{}. Press 'r' to retry.", error))
          .block(block)
          .style(Style::default().fg(Color::Red)),
        area,
      );
    } else {
      let columns = self.columns();
      let rows: Vec<Row> = self
        .rows()
        .iter()
        .map(|record| {
          Row::new(
            columns
              .iter()
              .map(|c| truncate(&record.get(c).map(cell_text).unwrap_or_default(), 24)),
          )
        })
        .collect();
      let widths = vec![Constraint::Fill(1); columns.len().max(1)];

      let table = Table::new(rows, widths)
        .header(Row::new(columns).style(Style::default().fg(Color::DarkGray).bold()))
        .block(block)
        .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

      ensure_valid_selection(&mut self.table_state, len);
      frame.render_stateful_widget(table, area, &mut self.table_state);
    }

    if let Some(form) = &self.form {
      form.render(frame, area);
    }
  }

  fn breadcrumb_label(&self) -> String {
    format!("Records: {}", self.table.as_str())
  }

  fn captures_input(&self) -> bool {
    self.form.is_some()
  }

  fn tick(&mut self) -> ViewAction {
    self.records.poll();
    match Pending::settle(&mut self.pending) {
      Some(Ok(message)) => {
        self.records.refetch();
        return ViewAction::Notify(message);
      }
      Some(Err(error)) => return ViewAction::Alert(error),
      None => {}
    }
    match Pending::settle(&mut self.export) {
      Some(Ok(message)) => ViewAction::Notify(message),
      Some(Err(error)) => ViewAction::Alert(error),
      None => ViewAction::None,
    }
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("tab", "switch table").with_priority(20),
      Shortcut::new("e", "edit").with_priority(30),
      Shortcut::new("d", "delete").with_priority(40),
      Shortcut::new("x", "export csv").with_priority(45),
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
  use reqwest::Method;
  use serde_json::json;
  use std::sync::Arc;
  use std::time::Duration;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn network() -> Arc<FakeNetwork> {
    let network = Arc::new(FakeNetwork::new());
    network.respond_json(
      "/api/data/machines/all",
      json!([
        {"id": 1, "name": "Press", "type": "press", "location": "A", "status": "running"},
        {"id": 2, "name": "Lathe", "type": "cnc", "location": "B", "status": "idle", "rated_capacity": 40}
      ]),
    );
    network.respond_json(
      "/api/data/sensors/all",
      json!([{"id": 9, "machine_id": 1, "value": 71.5, "timestamp": "2024-05-01T10:00:00"}]),
    );
    network
  }

  async fn loaded(network: Arc<FakeNetwork>) -> RecordsView {
    let mut view = RecordsView::new(services(network).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    view.tick();
    view
  }

  #[tokio::test]
  async fn test_columns_follow_server_order() {
    let view = loaded(network()).await;
    assert_eq!(
      view.columns(),
      vec!["id", "name", "type", "location", "status", "rated_capacity"]
    );
  }

  #[tokio::test]
  async fn test_edit_sends_put_with_editable_fields() {
    let network = network();
    network.respond_json("/api/data/machines/1", json!({"success": true}));
    let mut view = loaded(network.clone()).await;

    view.table_state.select(Some(0));
    view.handle_key(key(KeyCode::Char('e')));
    assert!(view.captures_input());
    view.handle_key(key(KeyCode::Char('X')));
    view.handle_key(key(KeyCode::Enter));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(matches!(view.tick(), ViewAction::Notify(message) if message == "Saved record 1"));
    let put = network
      .requests()
      .into_iter()
      .find(|r| r.method == Method::PUT)
      .unwrap();
    assert_eq!(put.url, "/api/data/machines/1");
    let body: Value = serde_json::from_slice(put.body.as_deref().unwrap()).unwrap();
    assert_eq!(
      body,
      json!({"name": "PressX", "type": "press", "location": "A", "status": "running"})
    );
  }

  #[tokio::test]
  async fn test_delete_needs_confirmation() {
    let network = network();
    network.respond_json("/api/data/machines/2", json!({"ok": true}));
    let mut view = loaded(network.clone()).await;
    view.table_state.select(Some(1));

    assert!(matches!(
      view.handle_key(key(KeyCode::Char('d'))),
      ViewAction::Notify(message) if message == "Press d again to delete record 2"
    ));
    view.handle_key(key(KeyCode::Char('d')));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(matches!(view.tick(), ViewAction::Notify(message) if message == "Deleted record 2"));
    assert!(network
      .requests()
      .iter()
      .any(|r| r.method == Method::DELETE && r.url == "/api/data/machines/2"));
  }

  #[tokio::test]
  async fn test_delete_offline_raises_alert() {
    let network = network();
    let mut view = loaded(network.clone()).await;
    view.table_state.select(Some(0));
    network.set_online(false);

    view.handle_key(key(KeyCode::Char('d')));
    view.handle_key(key(KeyCode::Char('d')));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(matches!(view.tick(), ViewAction::Alert(message) if message.contains("delete record")));
  }

  #[tokio::test]
  async fn test_toggle_loads_sensors() {
    let mut view = loaded(network()).await;
    view.handle_key(key(KeyCode::Tab));
    tokio::time::sleep(Duration::from_millis(20)).await;
    view.tick();

    assert_eq!(view.table, RecordTable::Sensors);
    assert_eq!(view.rows().len(), 1);
    assert_eq!(view.breadcrumb_label(), "Records: sensors");
  }

  #[test]
  fn test_records_csv_quotes_every_field() {
    let records: Vec<Record> = serde_json::from_value(json!([
      {"id": 1, "name": " Press \"Big\" ", "rated_capacity": null},
      {"id": 2, "name": "Lathe, B", "rated_capacity": 40}
    ]))
    .unwrap();
    let columns: Vec<String> = ["id", "name", "rated_capacity"]
      .iter()
      .map(|c| c.to_string())
      .collect();

    assert_eq!(
      records_csv(&columns, &records),
      "\"id\",\"name\",\"rated_capacity\"\n\"1\",\"Press \"\"Big\"\"\",\"\"\n\"2\",\"Lathe, B\",\"40\""
    );
  }

  #[tokio::test]
  async fn test_export_with_no_records_notifies() {
    let network = Arc::new(FakeNetwork::new());
    network.respond_json("/api/data/machines/all", json!([]));
    let mut view = loaded(network).await;

    assert!(matches!(
      view.handle_key(key(KeyCode::Char('x'))),
      ViewAction::Notify(message) if message == "No machines records to export"
    ));
    assert!(view.export.is_none());
  }

  #[test]
  fn test_edited_record_keeps_numbers() {
    let original: Record = serde_json::from_value(json!({"id": 9, "value": 71.5})).unwrap();
    let values: FormValues = [("value", "72".to_string()), ("timestamp", "now".to_string())]
      .into_iter()
      .collect();
    let record = edited_record(&original, RecordTable::Sensors.editable_fields(), &values);
    assert_eq!(record["value"], json!(72.0));
    assert_eq!(record["timestamp"], json!("now"));
  }
}
