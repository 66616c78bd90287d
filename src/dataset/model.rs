use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Type of a single column, fixed when the dataset is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
  Text,
  Numeric,
  Boolean,
  Timestamp,
  Categorical,
}

impl ColumnType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ColumnType::Text => "text",
      ColumnType::Numeric => "numeric",
      ColumnType::Boolean => "boolean",
      ColumnType::Timestamp => "timestamp",
      ColumnType::Categorical => "categorical",
    }
  }
}

impl fmt::Display for ColumnType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ColumnType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "text" => Ok(ColumnType::Text),
      "numeric" => Ok(ColumnType::Numeric),
      "boolean" => Ok(ColumnType::Boolean),
      "timestamp" | "date" => Ok(ColumnType::Timestamp),
      "categorical" => Ok(ColumnType::Categorical),
      other => Err(format!("unknown column type '{}'", other)),
    }
  }
}

/// Overall shape of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
  TimeSeries,
  Numeric,
  Categorical,
  Mixed,
  Sensor,
  Performance,
  Custom,
}

impl DatasetType {
  pub const ALL: [DatasetType; 7] = [
    DatasetType::TimeSeries,
    DatasetType::Numeric,
    DatasetType::Categorical,
    DatasetType::Mixed,
    DatasetType::Sensor,
    DatasetType::Performance,
    DatasetType::Custom,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      DatasetType::TimeSeries => "time_series",
      DatasetType::Numeric => "numeric",
      DatasetType::Categorical => "categorical",
      DatasetType::Mixed => "mixed",
      DatasetType::Sensor => "sensor",
      DatasetType::Performance => "performance",
      DatasetType::Custom => "custom",
    }
  }

  /// Human-readable label
  pub fn label(&self) -> &'static str {
    match self {
      DatasetType::TimeSeries => "Time Series Data",
      DatasetType::Numeric => "Numeric Data",
      DatasetType::Categorical => "Categorical Data",
      DatasetType::Mixed => "Mixed Data Types",
      DatasetType::Sensor => "Sensor Readings",
      DatasetType::Performance => "Performance Metrics",
      DatasetType::Custom => "Custom Dataset",
    }
  }
}

impl fmt::Display for DatasetType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DatasetType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    DatasetType::ALL
      .into_iter()
      .find(|t| t.as_str().eq_ignore_ascii_case(s))
      .ok_or_else(|| format!("unknown dataset type '{}'", s))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
  pub name: String,
  #[serde(rename = "type")]
  pub column_type: ColumnType,
  /// Choices for generated categorical columns
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<String>,
}

impl Column {
  pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
    Self {
      name: name.into(),
      column_type,
      options: Vec::new(),
    }
  }
}

/// A single value in a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
  Null,
  Bool(bool),
  Number(f64),
  Text(String),
}

impl Cell {
  /// Convert a JSON value. Nested arrays and objects keep their JSON text.
  pub fn from_json(value: &Value) -> Cell {
    match value {
      Value::Null => Cell::Null,
      Value::Bool(b) => Cell::Bool(*b),
      Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Null),
      Value::String(s) => Cell::Text(s.clone()),
      other => Cell::Text(other.to_string()),
    }
  }

  /// Missing or blank
  pub fn is_empty(&self) -> bool {
    match self {
      Cell::Null => true,
      Cell::Text(s) => s.is_empty(),
      _ => false,
    }
  }

  /// Numeric reading of the cell with float-prefix parsing; NaN when there is none.
  pub fn as_number(&self) -> f64 {
    match self {
      Cell::Number(n) => *n,
      Cell::Text(s) => parse_float(s),
      Cell::Null | Cell::Bool(_) => f64::NAN,
    }
  }
}

impl fmt::Display for Cell {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Cell::Null => Ok(()),
      Cell::Bool(b) => write!(f, "{}", b),
      Cell::Number(n) => f.write_str(&format_number(*n)),
      Cell::Text(s) => f.write_str(s),
    }
  }
}

/// Format a number the way it reads in a table: no trailing `.0`.
pub fn format_number(n: f64) -> String {
  if n.is_nan() {
    "NaN".to_string()
  } else if n == f64::INFINITY {
    "Infinity".to_string()
  } else if n == f64::NEG_INFINITY {
    "-Infinity".to_string()
  } else {
    format!("{}", n)
  }
}

/// Parse the longest leading decimal literal of `input`.
///
/// Leading whitespace is skipped and trailing garbage ignored, so `"12.5kg"`
/// reads as 12.5. Returns NaN when no digits lead the string.
pub fn parse_float(input: &str) -> f64 {
  let s = input.trim_start();
  let bytes = s.as_bytes();
  let len = bytes.len();
  let mut end = 0;

  if matches!(bytes.first(), Some(b'+' | b'-')) {
    end = 1;
  }
  if s[end..].starts_with("Infinity") {
    return if bytes[0] == b'-' {
      f64::NEG_INFINITY
    } else {
      f64::INFINITY
    };
  }

  let int_start = end;
  while end < len && bytes[end].is_ascii_digit() {
    end += 1;
  }
  let mut digits = end - int_start;

  if end < len && bytes[end] == b'.' {
    let frac_start = end + 1;
    let mut j = frac_start;
    while j < len && bytes[j].is_ascii_digit() {
      j += 1;
    }
    if j > frac_start {
      digits += j - frac_start;
      end = j;
    }
  }
  if digits == 0 {
    return f64::NAN;
  }

  if end < len && (bytes[end] == b'e' || bytes[end] == b'E') {
    let mut j = end + 1;
    if j < len && (bytes[j] == b'+' || bytes[j] == b'-') {
      j += 1;
    }
    let exp_start = j;
    while j < len && bytes[j].is_ascii_digit() {
      j += 1;
    }
    if j > exp_start {
      end = j;
    }
  }

  s[..end].parse().unwrap_or(f64::NAN)
}

static LAST_ID_MS: AtomicU64 = AtomicU64::new(0);

/// Time-based dataset id, `dataset_<millis>`. Strictly increasing within a process.
pub fn next_dataset_id() -> String {
  let now = Utc::now().timestamp_millis().max(0) as u64;
  let mut prev = LAST_ID_MS.load(Ordering::SeqCst);
  loop {
    let next = now.max(prev + 1);
    match LAST_ID_MS.compare_exchange_weak(prev, next, Ordering::SeqCst, Ordering::SeqCst) {
      Ok(_) => return format!("dataset_{}", next),
      Err(actual) => prev = actual,
    }
  }
}

/// Tabular data: an ordered schema plus rows aligned with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
  pub id: String,
  pub name: String,
  #[serde(rename = "type")]
  pub dataset_type: DatasetType,
  pub columns: Vec<Column>,
  pub rows: Vec<Vec<Cell>>,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub metadata: Map<String, Value>,
}

impl Dataset {
  /// New dataset with a fresh id and creation time.
  pub fn new(
    name: impl Into<String>,
    dataset_type: DatasetType,
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
    metadata: Map<String, Value>,
  ) -> Self {
    Self {
      id: next_dataset_id(),
      name: name.into(),
      dataset_type,
      columns,
      rows,
      created_at: Utc::now(),
      metadata,
    }
  }

  pub fn column_index(&self, name: &str) -> Option<usize> {
    self.columns.iter().position(|c| c.name == name)
  }

  pub fn column_names(&self) -> Vec<&str> {
    self.columns.iter().map(|c| c.name.as_str()).collect()
  }

  /// Indices of numeric columns, in schema order
  pub fn numeric_columns(&self) -> Vec<usize> {
    self
      .columns
      .iter()
      .enumerate()
      .filter(|(_, c)| c.column_type == ColumnType::Numeric)
      .map(|(i, _)| i)
      .collect()
  }

  /// First timestamp column, if any
  pub fn timestamp_column(&self) -> Option<usize> {
    self
      .columns
      .iter()
      .position(|c| c.column_type == ColumnType::Timestamp)
  }

  /// Cell at (`row`, `column`), or `Null` past the end of a short row.
  pub fn cell(&self, row: usize, column: usize) -> &Cell {
    static NULL: Cell = Cell::Null;
    self
      .rows
      .get(row)
      .and_then(|r| r.get(column))
      .unwrap_or(&NULL)
  }
}
