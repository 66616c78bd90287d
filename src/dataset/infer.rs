//! Column-type inference and dataset classification.

use super::model::{Cell, Column, ColumnType, DatasetType};

/// Rows sampled per column.
pub const SAMPLE_ROWS: usize = 10;

const BOOLEAN_WORDS: [&str; 6] = ["true", "false", "yes", "no", "1", "0"];

/// Infer a type for every column from the first [`SAMPLE_ROWS`] rows.
pub fn infer_columns(names: &[String], rows: &[Vec<Cell>]) -> Vec<Column> {
  names
    .iter()
    .enumerate()
    .map(|(idx, name)| {
      let samples = rows.iter().take(SAMPLE_ROWS).filter_map(|row| row.get(idx));
      Column::new(name.clone(), infer_column_type(samples))
    })
    .collect()
}

/// The first non-empty sample decides; no samples means text.
pub fn infer_column_type<'a>(samples: impl IntoIterator<Item = &'a Cell>) -> ColumnType {
  match samples.into_iter().find(|cell| !cell.is_empty()) {
    Some(Cell::Number(n)) if n.is_finite() => ColumnType::Numeric,
    Some(Cell::Bool(_)) => ColumnType::Boolean,
    Some(Cell::Text(s)) => infer_text_type(s),
    _ => ColumnType::Text,
  }
}

fn infer_text_type(value: &str) -> ColumnType {
  if is_finite_number(value) {
    ColumnType::Numeric
  } else if contains_date(value) {
    ColumnType::Timestamp
  } else if BOOLEAN_WORDS.contains(&value.to_lowercase().as_str()) {
    ColumnType::Boolean
  } else {
    ColumnType::Text
  }
}

/// Whole string (ignoring surrounding whitespace) is a finite number.
///
/// Unsigned `0x`, `0o` and `0b` integer literals count as numbers too.
fn is_finite_number(value: &str) -> bool {
  let value = value.trim();
  if let Some(radix_digits) = radix_literal(value) {
    return radix_digits;
  }
  value
    .parse::<f64>()
    .map(|n| n.is_finite())
    .unwrap_or(false)
}

fn radix_literal(value: &str) -> Option<bool> {
  let (prefix, digits) = value.split_at_checked(2)?;
  let radix = match prefix {
    "0x" | "0X" => 16,
    "0o" | "0O" => 8,
    "0b" | "0B" => 2,
    _ => return None,
  };
  Some(!digits.is_empty() && digits.chars().all(|c| c.is_digit(radix)))
}

/// Contains `YYYY-MM-DD` or `MM/DD/YYYY` anywhere.
pub fn contains_date(value: &str) -> bool {
  contains_shape(value, b"dddd-dd-dd") || contains_shape(value, b"dd/dd/dddd")
}

// `d` in the shape matches any ASCII digit, other bytes match literally
fn contains_shape(value: &str, shape: &[u8]) -> bool {
  value.as_bytes().windows(shape.len()).any(|window| {
    window.iter().zip(shape).all(|(b, s)| match s {
      b'd' => b.is_ascii_digit(),
      literal => b == literal,
    })
  })
}

/// Classify a dataset by the column types it holds.
pub fn classify(columns: &[Column]) -> DatasetType {
  let has = |t: ColumnType| columns.iter().any(|c| c.column_type == t);
  let timestamp = has(ColumnType::Timestamp);
  let numeric = has(ColumnType::Numeric);
  let categorical = has(ColumnType::Categorical);

  match (timestamp, numeric, categorical) {
    (true, true, _) => DatasetType::TimeSeries,
    (_, true, false) => DatasetType::Numeric,
    (_, false, true) => DatasetType::Categorical,
    (_, true, true) => DatasetType::Mixed,
    _ => DatasetType::Custom,
  }
}
