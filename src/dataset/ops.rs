//! Filter and transform operations. Every operation returns a new dataset and
//! leaves its input untouched.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use super::error::DatasetError;
use super::model::{format_number, parse_float, Cell, Column, ColumnType, Dataset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
  Equals,
  Contains,
  GreaterThan,
  LessThan,
  Between,
}

impl FilterOperator {
  pub const ALL: [FilterOperator; 5] = [
    FilterOperator::Equals,
    FilterOperator::Contains,
    FilterOperator::GreaterThan,
    FilterOperator::LessThan,
    FilterOperator::Between,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      FilterOperator::Equals => "equals",
      FilterOperator::Contains => "contains",
      FilterOperator::GreaterThan => "greater_than",
      FilterOperator::LessThan => "less_than",
      FilterOperator::Between => "between",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
  pub column: String,
  pub operator: FilterOperator,
  /// Scalar for most operators, `[low, high]` for `between`
  pub value: Value,
}

impl Filter {
  pub fn new(column: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
    Self {
      column: column.into(),
      operator,
      value,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalcOperation {
  Sum,
  Average,
  Multiply,
}

impl CalcOperation {
  pub const ALL: [CalcOperation; 3] = [
    CalcOperation::Sum,
    CalcOperation::Average,
    CalcOperation::Multiply,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      CalcOperation::Sum => "sum",
      CalcOperation::Average => "average",
      CalcOperation::Multiply => "multiply",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
  Sum,
  Avg,
  Min,
  Max,
  Count,
}

impl AggregateFunction {
  pub const ALL: [AggregateFunction; 5] = [
    AggregateFunction::Sum,
    AggregateFunction::Avg,
    AggregateFunction::Min,
    AggregateFunction::Max,
    AggregateFunction::Count,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      AggregateFunction::Sum => "sum",
      AggregateFunction::Avg => "avg",
      AggregateFunction::Min => "min",
      AggregateFunction::Max => "max",
      AggregateFunction::Count => "count",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
  pub column: String,
  pub function: AggregateFunction,
  pub new_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
  /// Derive a numeric column per row from `columns`
  Calculate {
    operation: CalcOperation,
    columns: Vec<String>,
    new_column: String,
  },
  /// Collapse rows into one row per distinct `group_by` value
  Aggregate {
    group_by: String,
    aggregations: Vec<Aggregation>,
  },
}

/// Keep rows matching every filter.
pub fn filter(dataset: &Dataset, filters: &[Filter]) -> Result<Dataset, DatasetError> {
  let mut rows = dataset.rows.clone();

  for f in filters {
    let idx = column_index(dataset, &f.column)?;
    let predicate = Predicate::compile(f)?;
    rows.retain(|row| predicate.matches(row.get(idx).unwrap_or(&Cell::Null)));
  }

  let mut result = dataset.clone();
  result.metadata.insert("filtered".to_string(), json!(true));
  result
    .metadata
    .insert("original_count".to_string(), json!(dataset.rows.len()));
  result
    .metadata
    .insert("filtered_count".to_string(), json!(rows.len()));
  result.rows = rows;
  Ok(result)
}

enum Predicate {
  Equals(String),
  Contains(String),
  GreaterThan(f64),
  LessThan(f64),
  Between(f64, f64),
}

impl Predicate {
  fn compile(f: &Filter) -> Result<Self, DatasetError> {
    Ok(match f.operator {
      FilterOperator::Equals => Predicate::Equals(value_text(&f.value)),
      FilterOperator::Contains => Predicate::Contains(value_text(&f.value).to_lowercase()),
      FilterOperator::GreaterThan => Predicate::GreaterThan(value_number(&f.value)),
      FilterOperator::LessThan => Predicate::LessThan(value_number(&f.value)),
      FilterOperator::Between => match &f.value {
        Value::Array(bounds) if bounds.len() == 2 => {
          Predicate::Between(value_number(&bounds[0]), value_number(&bounds[1]))
        }
        other => {
          return Err(DatasetError::InvalidFilter {
            operator: f.operator.as_str(),
            reason: format!("expected [low, high], got {}", other),
          })
        }
      },
    })
  }

  // NaN on either side makes every numeric comparison false
  fn matches(&self, cell: &Cell) -> bool {
    match self {
      Predicate::Equals(expected) => cell.to_string() == *expected,
      Predicate::Contains(needle) => cell.to_string().to_lowercase().contains(needle.as_str()),
      Predicate::GreaterThan(bound) => cell.as_number() > *bound,
      Predicate::LessThan(bound) => cell.as_number() < *bound,
      Predicate::Between(low, high) => {
        let n = cell.as_number();
        n >= *low && n <= *high
      }
    }
  }
}

fn value_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
    other => other.to_string(),
  }
}

fn value_number(value: &Value) -> f64 {
  match value {
    Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
    Value::String(s) => parse_float(s),
    _ => f64::NAN,
  }
}

/// Apply transforms in order. An aggregation ends the pass.
pub fn transform(dataset: &Dataset, transforms: &[Transform]) -> Result<Dataset, DatasetError> {
  let mut result = dataset.clone();
  let mut aggregated = false;

  for t in transforms {
    if aggregated {
      return Err(DatasetError::TransformAfterAggregate);
    }
    match t {
      Transform::Calculate {
        operation,
        columns,
        new_column,
      } => calculate(&mut result, *operation, columns, new_column)?,
      Transform::Aggregate {
        group_by,
        aggregations,
      } => {
        aggregate(&mut result, group_by, aggregations)?;
        aggregated = true;
      }
    }
  }

  result.metadata.insert("transformed".to_string(), json!(true));
  Ok(result)
}

fn calculate(
  dataset: &mut Dataset,
  operation: CalcOperation,
  columns: &[String],
  new_column: &str,
) -> Result<(), DatasetError> {
  if columns.is_empty() {
    return Err(DatasetError::NoSourceColumns);
  }
  let sources = columns
    .iter()
    .map(|c| column_index(dataset, c))
    .collect::<Result<Vec<_>, _>>()?;

  let target = match dataset.column_index(new_column) {
    Some(idx) => {
      dataset.columns[idx].column_type = ColumnType::Numeric;
      idx
    }
    None => {
      dataset.columns.push(Column::new(new_column, ColumnType::Numeric));
      dataset.columns.len() - 1
    }
  };

  for row in &mut dataset.rows {
    let value = |idx: usize, default: f64| {
      let n = row.get(idx).map_or(f64::NAN, Cell::as_number);
      if n.is_nan() {
        default
      } else {
        n
      }
    };
    let derived = match operation {
      CalcOperation::Sum => sources.iter().map(|&i| value(i, 0.0)).sum::<f64>(),
      CalcOperation::Average => {
        sources.iter().map(|&i| value(i, 0.0)).sum::<f64>() / sources.len() as f64
      }
      CalcOperation::Multiply => sources.iter().map(|&i| value(i, 1.0)).product::<f64>(),
    };

    if row.len() <= target {
      row.resize(target + 1, Cell::Null);
    }
    row[target] = Cell::Number(derived);
  }

  Ok(())
}

fn aggregate(
  dataset: &mut Dataset,
  group_by: &str,
  aggregations: &[Aggregation],
) -> Result<(), DatasetError> {
  let key_idx = column_index(dataset, group_by)?;
  let source_idx = aggregations
    .iter()
    .map(|a| column_index(dataset, &a.column))
    .collect::<Result<Vec<_>, _>>()?;

  // Groups in first-seen order
  let mut order: Vec<(Cell, Vec<usize>)> = Vec::new();
  let mut lookup: HashMap<String, usize> = HashMap::new();
  for (row_idx, row) in dataset.rows.iter().enumerate() {
    let key = row.get(key_idx).cloned().unwrap_or(Cell::Null);
    let slot = *lookup.entry(key.to_string()).or_insert_with(|| {
      order.push((key, Vec::new()));
      order.len() - 1
    });
    order[slot].1.push(row_idx);
  }

  let rows: Vec<Vec<Cell>> = order
    .iter()
    .map(|(key, members)| {
      let mut out = vec![key.clone()];
      for (agg, &col) in aggregations.iter().zip(&source_idx) {
        let values: Vec<f64> = members
          .iter()
          .map(|&r| {
            let n = dataset.cell(r, col).as_number();
            if n.is_nan() {
              0.0
            } else {
              n
            }
          })
          .collect();
        out.push(Cell::Number(apply(agg.function, &values)));
      }
      out
    })
    .collect();

  let mut columns = vec![dataset.columns[key_idx].clone()];
  columns.extend(
    aggregations
      .iter()
      .map(|a| Column::new(a.new_column.clone(), ColumnType::Numeric)),
  );

  dataset.columns = columns;
  dataset.rows = rows;
  Ok(())
}

fn apply(function: AggregateFunction, values: &[f64]) -> f64 {
  match function {
    AggregateFunction::Sum => values.iter().sum(),
    AggregateFunction::Avg => values.iter().sum::<f64>() / values.len() as f64,
    AggregateFunction::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
    AggregateFunction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    AggregateFunction::Count => values.len() as f64,
  }
}

fn column_index(dataset: &Dataset, name: &str) -> Result<usize, DatasetError> {
  dataset
    .column_index(name)
    .ok_or_else(|| DatasetError::UnknownColumn(name.to_string()))
}
