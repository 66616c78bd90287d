use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, TableState};
use serde_json::Value;
use std::path::PathBuf;

use super::Pending;
use crate::dataset::{
  filter, generate, import_file, transform, AggregateFunction, Aggregation, CalcOperation,
  Dataset, DatasetType, Filter, FilterOperator, GenerateRequest, Pattern, Transform,
};
use crate::query::{Query, QueryState};
use crate::services::Services;
use crate::ui::components::{Form, FormEvent, FormValues, KeyResult};
use crate::ui::renderfns::{dataset_series, draw_line_chart, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::{ensure_valid_selection, move_selection};

const PREVIEW_ROWS: usize = 50;
const AUTO_TYPE: &str = "auto";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormKind {
  Import,
  Generate,
  Filter,
  Calculate,
  Aggregate,
}

fn pick<T: Copy>(all: &[T], name: &str, as_str: fn(&T) -> &'static str) -> Option<T> {
  all.iter().copied().find(|item| as_str(item) == name)
}

fn filter_from(values: &FormValues) -> Result<Filter, String> {
  let operator = pick(&FilterOperator::ALL, values.get("Operator"), FilterOperator::as_str)
    .ok_or_else(|| format!("Unknown operator '{}'", values.get("Operator")))?;
  let raw = values.get("Value");
  let value = if operator == FilterOperator::Between {
    let Some((lo, hi)) = raw.split_once(',') else {
      return Err("Between needs a range like 10,20".to_string());
    };
    Value::Array(vec![
      Value::String(lo.trim().to_string()),
      Value::String(hi.trim().to_string()),
    ])
  } else {
    Value::String(raw.to_string())
  };
  Ok(Filter::new(values.get("Column"), operator, value))
}

fn calculation_from(values: &FormValues) -> Result<Transform, String> {
  let operation = pick(&CalcOperation::ALL, values.get("Operation"), CalcOperation::as_str)
    .ok_or_else(|| format!("Unknown operation '{}'", values.get("Operation")))?;
  let columns = values
    .get("Columns")
    .split(',')
    .map(str::trim)
    .filter(|c| !c.is_empty())
    .map(str::to_string)
    .collect();
  Ok(Transform::Calculate {
    operation,
    columns,
    new_column: values.get("New column").to_string(),
  })
}

fn aggregation_from(values: &FormValues) -> Result<Transform, String> {
  let function = pick(&AggregateFunction::ALL, values.get("Function"), AggregateFunction::as_str)
    .ok_or_else(|| format!("Unknown function '{}'", values.get("Function")))?;
  Ok(Transform::Aggregate {
    group_by: values.get("Group by").to_string(),
    aggregations: vec![Aggregation {
      column: values.get("Column").to_string(),
      function,
      new_column: values.get("New column").to_string(),
    }],
  })
}

fn generate_request(values: &FormValues) -> Result<GenerateRequest, String> {
  let rows = values
    .get("Rows")
    .parse::<usize>()
    .map_err(|_| format!("Rows '{}' is not a number", values.get("Rows")))?;
  let pattern: Pattern = values.get("Pattern").parse()?;
  let mut request = GenerateRequest::time_series(values.get("Name"), rows, pattern);
  request.dataset_type = match values.get("Type") {
    AUTO_TYPE => None,
    other => Some(other.parse::<DatasetType>()?),
  };
  Ok(request)
}

/// Stored datasets plus a working copy that filters and transforms apply to.
///
/// The working copy is never written back; `x` restores the loaded dataset.
pub struct DatasetsView {
  services: Services,
  list: Query<Vec<Dataset>>,
  table_state: TableState,
  current: Option<Dataset>,
  original: Option<Dataset>,
  form: Option<(FormKind, Form)>,
  loading: Option<Query<Dataset>>,
  pending: Option<Pending>,
}

impl DatasetsView {
  pub fn new(services: Services) -> Self {
    let store = services.datasets.clone();
    let mut list = Query::new(move || {
      let store = store.clone();
      async move { store.get_all().await.map_err(|e| e.to_string()) }
    });
    list.fetch();

    Self {
      services,
      list,
      table_state: TableState::default(),
      current: None,
      original: None,
      form: None,
      loading: None,
      pending: None,
    }
  }

  fn stored(&self) -> &[Dataset] {
    self.list.data().map(Vec::as_slice).unwrap_or(&[])
  }

  fn selected(&self) -> Option<&Dataset> {
    self.table_state.selected().and_then(|i| self.stored().get(i))
  }

  fn open(&mut self, dataset: Dataset) {
    self.original = Some(dataset.clone());
    self.current = Some(dataset);
  }

  fn column_choices(&self) -> Vec<String> {
    self
      .current
      .as_ref()
      .map(|d| d.columns.iter().map(|c| c.name.clone()).collect())
      .unwrap_or_default()
  }

  fn build_form(&self, kind: FormKind) -> Form {
    match kind {
      FormKind::Import => Form::new("Import CSV or JSON").required("Path"),
      FormKind::Generate => Form::new("Generate dataset")
        .text("Name", "Generated")
        .text("Rows", "100")
        .choice("Pattern", Pattern::ALL.iter().map(Pattern::as_str))
        .choice(
          "Type",
          std::iter::once(AUTO_TYPE).chain(DatasetType::ALL.iter().map(DatasetType::as_str)),
        ),
      FormKind::Filter => Form::new("Filter rows")
        .choice("Column", self.column_choices())
        .choice("Operator", FilterOperator::ALL.iter().map(FilterOperator::as_str))
        .required("Value"),
      FormKind::Calculate => Form::new("Calculate column")
        .choice("Operation", CalcOperation::ALL.iter().map(CalcOperation::as_str))
        .required("Columns")
        .required("New column"),
      FormKind::Aggregate => Form::new("Aggregate")
        .choice("Group by", self.column_choices())
        .choice("Column", self.column_choices())
        .choice("Function", AggregateFunction::ALL.iter().map(AggregateFunction::as_str))
        .required("New column"),
    }
  }

  fn open_form(&mut self, kind: FormKind) -> ViewAction {
    let needs_data = matches!(kind, FormKind::Filter | FormKind::Calculate | FormKind::Aggregate);
    if needs_data && self.current.is_none() {
      return ViewAction::Notify("Load or import a dataset first".to_string());
    }
    self.form = Some((kind, self.build_form(kind)));
    ViewAction::None
  }

  /// Produce a dataset off the UI task, store it, then open it.
  fn load_with<F>(&mut self, make: F)
  where
    F: FnOnce() -> Result<Dataset, String> + Send + 'static,
  {
    let store = self.services.datasets.clone();
    self.loading = Some(Query::once(async move {
      let dataset = tokio::task::spawn_blocking(make)
        .await
        .map_err(|e| format!("Failed to load dataset: {}", e))??;
      store.put(&dataset).await.map_err(|e| e.to_string())?;
      Ok(dataset)
    }));
  }

  /// Replace the working copy with the result of a pure operation.
  fn apply(&mut self, op: impl FnOnce(&Dataset) -> Result<Dataset, String>) -> ViewAction {
    let Some(current) = &self.current else {
      return ViewAction::None;
    };
    match op(current) {
      Ok(next) => {
        let message = format!("{} rows, {} columns", next.rows.len(), next.columns.len());
        self.current = Some(next);
        ViewAction::Notify(message)
      }
      Err(error) => ViewAction::Notify(error),
    }
  }

  fn submit(&mut self, kind: FormKind, values: FormValues) -> ViewAction {
    match kind {
      FormKind::Import => {
        let path = PathBuf::from(values.get("Path"));
        self.load_with(move || import_file(&path).map_err(|e| e.to_string()));
        ViewAction::None
      }
      FormKind::Generate => match generate_request(&values) {
        Ok(request) => {
          self.load_with(move || Ok(generate(&request)));
          ViewAction::None
        }
        Err(error) => ViewAction::Notify(error),
      },
      FormKind::Filter => match filter_from(&values) {
        Ok(f) => self.apply(|d| filter(d, &[f]).map_err(|e| e.to_string())),
        Err(error) => ViewAction::Notify(error),
      },
      FormKind::Calculate => match calculation_from(&values) {
        Ok(t) => self.apply(|d| transform(d, &[t]).map_err(|e| e.to_string())),
        Err(error) => ViewAction::Notify(error),
      },
      FormKind::Aggregate => match aggregation_from(&values) {
        Ok(t) => self.apply(|d| transform(d, &[t]).map_err(|e| e.to_string())),
        Err(error) => ViewAction::Notify(error),
      },
    }
  }

  fn delete_selected(&mut self) -> ViewAction {
    let Some(dataset) = self.selected() else {
      return ViewAction::None;
    };
    let id = dataset.id.clone();
    let name = dataset.name.clone();
    if self.current.as_ref().is_some_and(|d| d.id == id) {
      self.current = None;
      self.original = None;
    }

    let store = self.services.datasets.clone();
    self.pending = Some(Pending::spawn(async move {
      store.delete(&id).await?;
      Ok(format!("Deleted {}", name))
    }));
    ViewAction::None
  }

  fn handle_form(&mut self, key: KeyEvent) -> Option<ViewAction> {
    let (kind, form) = self.form.as_mut()?;
    let kind = *kind;
    Some(match form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted(values)) => {
        self.form = None;
        self.submit(kind, values)
      }
      KeyResult::Event(FormEvent::Cancelled) => {
        self.form = None;
        ViewAction::None
      }
      KeyResult::Handled | KeyResult::NotHandled => ViewAction::None,
    })
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.stored().len();
    let rows: Vec<Row> = self
      .stored()
      .iter()
      .map(|d| {
        Row::new(vec![
          Span::raw(truncate(&d.name, 20)),
          Span::styled(d.dataset_type.as_str(), Style::default().fg(Color::Cyan)),
          Span::raw(d.rows.len().to_string()),
        ])
      })
      .collect();
    let title = match self.list.state() {
      QueryState::Loading => " Stored (loading...) ".to_string(),
      _ => format!(" Stored ({}) ", len),
    };

    let table = Table::new(
      rows,
      [Constraint::Min(10), Constraint::Length(12), Constraint::Length(5)],
    )
    .header(Row::new(vec!["Name", "Type", "Rows"]).style(Style::default().fg(Color::DarkGray).bold()))
    .block(
      Block::default()
        .title(title)
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue)),
    )
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("> ");

    ensure_valid_selection(&mut self.table_state, len);
    frame.render_stateful_widget(table, area, &mut self.table_state);
  }

  fn render_info(&self, frame: &mut Frame, area: Rect, dataset: &Dataset) {
    let mut spans = vec![
      Span::styled(format!(" {} ", dataset.name), Style::default().fg(Color::White).bold()),
      Span::styled(dataset.dataset_type.label(), Style::default().fg(Color::Cyan)),
      Span::raw(format!(
        "  {} rows  {} columns",
        dataset.rows.len(),
        dataset.columns.len()
      )),
    ];
    for flag in ["filtered", "transformed"] {
      if dataset.metadata.get(flag) == Some(&Value::Bool(true)) {
        spans.push(Span::styled(format!("  [{}]", flag), Style::default().fg(Color::Yellow)));
      }
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
  }

  fn render_preview(&self, frame: &mut Frame, area: Rect, dataset: &Dataset) {
    let header = Row::new(
      dataset
        .columns
        .iter()
        .map(|c| format!("{} ({})", c.name, c.column_type.as_str())),
    )
    .style(Style::default().fg(Color::DarkGray).bold());
    let rows: Vec<Row> = dataset
      .rows
      .iter()
      .take(PREVIEW_ROWS)
      .map(|row| Row::new(row.iter().map(|cell| truncate(&cell.to_string(), 24))))
      .collect();
    let widths = vec![Constraint::Fill(1); dataset.columns.len().max(1)];

    let table = Table::new(rows, widths).header(header).block(
      Block::default()
        .title(format!(" Rows (first {}) ", PREVIEW_ROWS.min(dataset.rows.len())))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue)),
    );
    frame.render_widget(table, area);
  }
}

impl View for DatasetsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if let Some(action) = self.handle_form(key) {
      return action;
    }
    let len = self.stored().len();
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => move_selection(&mut self.table_state, len, 1),
      KeyCode::Char('k') | KeyCode::Up => move_selection(&mut self.table_state, len, -1),
      KeyCode::Enter => {
        if let Some(dataset) = self.selected().cloned() {
          let message = format!("Loaded {}", dataset.name);
          self.open(dataset);
          return ViewAction::Notify(message);
        }
      }
      KeyCode::Char('i') => return self.open_form(FormKind::Import),
      KeyCode::Char('g') => return self.open_form(FormKind::Generate),
      KeyCode::Char('f') => return self.open_form(FormKind::Filter),
      KeyCode::Char('c') => return self.open_form(FormKind::Calculate),
      KeyCode::Char('a') => return self.open_form(FormKind::Aggregate),
      KeyCode::Char('x') => {
        if let Some(original) = &self.original {
          self.current = Some(original.clone());
          return ViewAction::Notify("Reset to the loaded dataset".to_string());
        }
      }
      KeyCode::Char('d') => return self.delete_selected(),
      KeyCode::Char('r') => self.list.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let columns = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Length(42), Constraint::Min(20)])
      .split(area);
    self.render_list(frame, columns[0]);

    match &self.current {
      Some(dataset) => {
        let right = Layout::default()
          .direction(Direction::Vertical)
          .constraints([
            Constraint::Length(1),
            Constraint::Percentage(45),
            Constraint::Min(5),
          ])
          .split(columns[1]);
        self.render_info(frame, right[0], dataset);
        let (series, labels) = dataset_series(dataset);
        draw_line_chart(frame, right[1], "Chart", &series, &labels);
        self.render_preview(frame, right[2], dataset);
      }
      None => {
        let message = if self.loading.is_some() {
          "Loading dataset..."
        } else {
          "Press Enter to open a stored dataset, 'i' to import a file or 'g' to generate one."
        };
        frame.render_widget(
          Paragraph::new(message)
            .style(Style::default().fg(Color::DarkGray))
            .block(
              Block::default()
                .title(" Dataset ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Blue)),
            ),
          columns[1],
        );
      }
    }

    if let Some((_, form)) = &self.form {
      form.render(frame, area);
    }
  }

  fn breadcrumb_label(&self) -> String {
    "Datasets".to_string()
  }

  fn captures_input(&self) -> bool {
    self.form.is_some()
  }

  fn tick(&mut self) -> ViewAction {
    self.list.poll();

    if let Some(loading) = self.loading.as_mut() {
      if loading.poll() {
        let outcome = match loading.state() {
          QueryState::Success(dataset) => Ok(dataset.clone()),
          QueryState::Error(error) => Err(error.clone()),
          QueryState::Idle | QueryState::Loading => return ViewAction::None,
        };
        self.loading = None;
        return match outcome {
          Ok(dataset) => {
            let message = format!("Loaded {} ({} rows)", dataset.name, dataset.rows.len());
            self.open(dataset);
            self.list.refetch();
            ViewAction::Notify(message)
          }
          Err(error) => ViewAction::Notify(error),
        };
      }
    }

    match Pending::settle(&mut self.pending) {
      Some(Ok(message)) => {
        self.list.refetch();
        ViewAction::Notify(message)
      }
      Some(Err(error)) => ViewAction::Notify(error),
      None => ViewAction::None,
    }
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("i", "import").with_priority(20),
      Shortcut::new("g", "generate").with_priority(30),
      Shortcut::new("f", "filter").with_priority(40),
      Shortcut::new("c/a", "calc/aggregate").with_priority(50),
      Shortcut::new("x", "reset").with_priority(60),
      Shortcut::new("d", "delete").with_priority(70),
      Shortcut::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dataset::import_csv;
  use crate::offline::testing::FakeNetwork;
  use crate::services::testing::services;
  use crossterm::event::KeyModifiers;
  use std::sync::Arc;
  use std::time::Duration;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_text(view: &mut DatasetsView, text: &str) {
    for c in text.chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
  }

  fn values(pairs: &[(&'static str, &str)]) -> FormValues {
    pairs.iter().map(|(label, value)| (*label, value.to_string())).collect()
  }

  async fn view() -> DatasetsView {
    DatasetsView::new(services(Arc::new(FakeNetwork::new())).await)
  }

  fn readings() -> Dataset {
    import_csv(
      "readings",
      "machine,temp,load\nA,70,5\nB,82,7\nA,90,2\nC,65,4",
    )
    .unwrap()
  }

  #[tokio::test]
  async fn test_generate_stores_and_opens() {
    let mut view = view().await;
    view.handle_key(key(KeyCode::Char('g')));
    view.handle_key(key(KeyCode::Enter));
    tokio::time::sleep(Duration::from_millis(50)).await;

    match view.tick() {
      ViewAction::Notify(message) => assert_eq!(message, "Loaded Generated (100 rows)"),
      _ => panic!("expected a notice"),
    }
    assert_eq!(view.current.as_ref().unwrap().rows.len(), 100);
    tokio::time::sleep(Duration::from_millis(20)).await;
    view.tick();
    assert_eq!(view.stored().len(), 1);
  }

  #[tokio::test]
  async fn test_filter_then_reset() {
    let mut view = view().await;
    view.open(readings());

    view.handle_key(key(KeyCode::Char('f')));
    // Column stays on "machine", operator stays on "equals"
    view.handle_key(key(KeyCode::Tab));
    view.handle_key(key(KeyCode::Tab));
    type_text(&mut view, "A");
    assert!(matches!(view.handle_key(key(KeyCode::Enter)), ViewAction::Notify(_)));
    assert_eq!(view.current.as_ref().unwrap().rows.len(), 2);

    view.handle_key(key(KeyCode::Char('x')));
    assert_eq!(view.current.as_ref().unwrap().rows.len(), 4);
  }

  #[tokio::test]
  async fn test_between_filter_and_aggregate() {
    let mut view = view().await;
    view.open(readings());

    let between = values(&[
      ("Column", "temp"),
      ("Operator", "between"),
      ("Value", "70, 85"),
    ]);
    view.submit(FormKind::Filter, between);
    assert_eq!(view.current.as_ref().unwrap().rows.len(), 2);

    let aggregate = values(&[
      ("Group by", "machine"),
      ("Column", "load"),
      ("Function", "sum"),
      ("New column", "total"),
    ]);
    view.submit(FormKind::Aggregate, aggregate);
    let current = view.current.as_ref().unwrap();
    assert_eq!(current.column_names(), vec!["machine", "total"]);
    assert_eq!(current.rows.len(), 2);
  }

  #[tokio::test]
  async fn test_operations_need_a_dataset() {
    let mut view = view().await;
    assert!(matches!(
      view.handle_key(key(KeyCode::Char('c'))),
      ViewAction::Notify(message) if message == "Load or import a dataset first"
    ));
    assert!(view.form.is_none());
  }

  #[tokio::test]
  async fn test_calculate_unknown_column_is_a_notice() {
    let mut view = view().await;
    view.open(readings());
    let calc = values(&[
      ("Operation", "sum"),
      ("Columns", "temp, nope"),
      ("New column", "x"),
    ]);
    assert!(matches!(
      view.submit(FormKind::Calculate, calc),
      ViewAction::Notify(message) if message.contains("nope")
    ));
    assert_eq!(view.current.as_ref().unwrap().columns.len(), 3);
  }

  #[tokio::test]
  async fn test_import_missing_file_is_a_notice() {
    let mut view = view().await;
    view.handle_key(key(KeyCode::Char('i')));
    type_text(&mut view, "/nonexistent/readings.csv");
    view.handle_key(key(KeyCode::Enter));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(view.tick(), ViewAction::Notify(message) if message.contains("Failed to read")));
    assert!(view.current.is_none());
  }

  #[tokio::test]
  async fn test_delete_selected() {
    let mut view = view().await;
    view.services.datasets.put(&readings()).await.unwrap();
    view.list.refetch();
    tokio::time::sleep(Duration::from_millis(20)).await;
    view.tick();
    view.table_state.select(Some(0));

    view.handle_key(key(KeyCode::Char('d')));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(matches!(view.tick(), ViewAction::Notify(message) if message == "Deleted readings"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    view.tick();
    assert!(view.stored().is_empty());
  }
}
