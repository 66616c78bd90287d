use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use std::fmt;
use std::str::FromStr;

use super::import::MAX_ROWS;
use super::infer::classify;
use super::model::{Cell, Column, ColumnType, Dataset, DatasetType};

/// Shape of generated numeric series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
  #[default]
  Linear,
  Random,
  Sine,
  TrendUp,
  TrendDown,
}

impl Pattern {
  pub const ALL: [Pattern; 5] = [
    Pattern::Linear,
    Pattern::Random,
    Pattern::Sine,
    Pattern::TrendUp,
    Pattern::TrendDown,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Pattern::Linear => "linear",
      Pattern::Random => "random",
      Pattern::Sine => "sine",
      Pattern::TrendUp => "trend_up",
      Pattern::TrendDown => "trend_down",
    }
  }

  fn value(&self, i: usize, n: usize, rng: &mut impl Rng) -> f64 {
    let progress = i as f64 / n as f64;
    match self {
      Pattern::Linear => progress * 100.0,
      Pattern::Random => rng.gen_range(0.0..100.0),
      Pattern::Sine => 50.0 + 30.0 * (i as f64 * 0.1).sin(),
      Pattern::TrendUp => 20.0 + progress * 60.0,
      Pattern::TrendDown => 80.0 - progress * 60.0,
    }
  }
}

impl fmt::Display for Pattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Pattern {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Pattern::ALL
      .into_iter()
      .find(|p| p.as_str().eq_ignore_ascii_case(s))
      .ok_or_else(|| format!("unknown pattern '{}'", s))
  }
}

/// Parameters for a synthetic dataset.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
  pub name: String,
  /// Classified from the columns when not given
  pub dataset_type: Option<DatasetType>,
  pub columns: Vec<Column>,
  pub rows: usize,
  pub pattern: Pattern,
}

impl GenerateRequest {
  /// A timestamp column plus one numeric column.
  pub fn time_series(name: impl Into<String>, rows: usize, pattern: Pattern) -> Self {
    Self {
      name: name.into(),
      dataset_type: None,
      columns: vec![
        Column::new("timestamp", ColumnType::Timestamp),
        Column::new("value", ColumnType::Numeric),
      ],
      rows,
      pattern,
    }
  }
}

const DEFAULT_OPTIONS: [&str; 4] = ["A", "B", "C", "D"];

/// Generate a dataset ending at the current time.
pub fn generate(request: &GenerateRequest) -> Dataset {
  generate_at(request, Utc::now(), &mut rand::thread_rng())
}

/// Generate with an explicit clock and random source.
pub fn generate_at(request: &GenerateRequest, now: DateTime<Utc>, rng: &mut impl Rng) -> Dataset {
  let n = request.rows.min(MAX_ROWS);

  let rows = (0..n)
    .map(|i| {
      request
        .columns
        .iter()
        .map(|col| match col.column_type {
          ColumnType::Timestamp => {
            let minutes_back = (n - 1 - i) as i64;
            let at = now - Duration::minutes(minutes_back);
            Cell::Text(at.to_rfc3339_opts(SecondsFormat::Millis, true))
          }
          ColumnType::Numeric => {
            let v = request.pattern.value(i, n, rng);
            Cell::Number((v * 100.0).round() / 100.0)
          }
          ColumnType::Categorical => {
            let pick = if col.options.is_empty() {
              DEFAULT_OPTIONS[rng.gen_range(0..DEFAULT_OPTIONS.len())].to_string()
            } else {
              col.options[rng.gen_range(0..col.options.len())].clone()
            };
            Cell::Text(pick)
          }
          ColumnType::Text => Cell::Text(format!("Value {}", i + 1)),
          ColumnType::Boolean => Cell::Text(format!("Data {}", i + 1)),
        })
        .collect()
    })
    .collect();

  let mut metadata = Map::new();
  metadata.insert("row_count".to_string(), json!(n));
  metadata.insert("pattern".to_string(), json!(request.pattern.as_str()));

  let dataset_type = request
    .dataset_type
    .unwrap_or_else(|| classify(&request.columns));
  Dataset::new(
    request.name.clone(),
    dataset_type,
    request.columns.clone(),
    rows,
    metadata,
  )
}
