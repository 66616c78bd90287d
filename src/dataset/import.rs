use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::info;

use super::error::DatasetError;
use super::infer::{classify, infer_columns};
use super::model::{Cell, Column, Dataset};

/// Row cap applied to every import.
pub const MAX_ROWS: usize = 1000;

/// Import comma-separated text. Fields are not quoted or escaped.
pub fn import_csv(name: &str, text: &str) -> Result<Dataset, DatasetError> {
  let lines: Vec<&str> = text
    .split('\n')
    .filter(|line| !line.trim().is_empty())
    .collect();
  if lines.len() < 2 {
    return Err(DatasetError::CsvTooShort);
  }

  let headers: Vec<String> = lines[0].split(',').map(|h| h.trim().to_string()).collect();
  let rows: Vec<Vec<Cell>> = lines[1..]
    .iter()
    .take(MAX_ROWS)
    .map(|line| {
      let values: Vec<&str> = line.split(',').collect();
      (0..headers.len())
        .map(|idx| Cell::Text(values.get(idx).map_or("", |v| v.trim()).to_string()))
        .collect()
    })
    .collect();

  let columns = infer_columns(&headers, &rows);
  Ok(build(name, columns, rows, "csv_import"))
}

/// Import JSON: either an array of row objects or `{"columns": [...], "rows": [...]}`.
pub fn import_json(name: &str, text: &str) -> Result<Dataset, DatasetError> {
  let data: Value =
    serde_json::from_str(text).map_err(|e| DatasetError::JsonParse(e.to_string()))?;

  match data {
    Value::Array(items) => {
      let objects = items
        .into_iter()
        .take(MAX_ROWS)
        .map(|item| match item {
          Value::Object(obj) => Ok(obj),
          _ => Err(DatasetError::InvalidJsonFormat),
        })
        .collect::<Result<Vec<_>, _>>()?;

      let names: Vec<String> = objects
        .first()
        .map(|first| first.keys().cloned().collect())
        .unwrap_or_default();
      let rows: Vec<Vec<Cell>> = objects.iter().map(|obj| row_from_object(obj, &names)).collect();

      let columns = infer_columns(&names, &rows);
      Ok(build(name, columns, rows, "json_import"))
    }
    Value::Object(mut obj) if obj.contains_key("columns") && obj.contains_key("rows") => {
      let columns: Vec<Column> = obj
        .remove("columns")
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| DatasetError::JsonParse(e.to_string()))?
        .unwrap_or_default();
      let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

      let Some(Value::Array(items)) = obj.remove("rows") else {
        return Err(DatasetError::InvalidJsonFormat);
      };
      let rows = items
        .iter()
        .take(MAX_ROWS)
        .map(|item| match item {
          Value::Object(row) => Ok(row_from_object(row, &names)),
          Value::Array(values) => Ok(
            (0..names.len())
              .map(|idx| values.get(idx).map_or(Cell::Null, Cell::from_json))
              .collect(),
          ),
          _ => Err(DatasetError::InvalidJsonFormat),
        })
        .collect::<Result<Vec<_>, _>>()?;

      Ok(build(name, columns, rows, "json_import"))
    }
    _ => Err(DatasetError::InvalidJsonFormat),
  }
}

/// Import a `.csv` or `.json` file; the dataset is named after the file stem.
pub fn import_file(path: &Path) -> Result<Dataset, DatasetError> {
  let extension = path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_lowercase())
    .unwrap_or_default();
  if extension != "csv" && extension != "json" {
    return Err(DatasetError::UnsupportedFileType(extension));
  }

  let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Read {
    path: path.display().to_string(),
    source,
  })?;
  let name = path
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or("dataset");

  let dataset = if extension == "csv" {
    import_csv(name, &text)?
  } else {
    import_json(name, &text)?
  };
  info!(
    id = %dataset.id,
    rows = dataset.rows.len(),
    kind = %dataset.dataset_type,
    "imported dataset from {}",
    path.display()
  );
  Ok(dataset)
}

fn row_from_object(obj: &Map<String, Value>, names: &[String]) -> Vec<Cell> {
  names
    .iter()
    .map(|name| obj.get(name).map_or(Cell::Null, Cell::from_json))
    .collect()
}

fn build(name: &str, columns: Vec<Column>, rows: Vec<Vec<Cell>>, source: &str) -> Dataset {
  let mut metadata = Map::new();
  metadata.insert("row_count".to_string(), json!(rows.len()));
  metadata.insert("source".to_string(), json!(source));
  Dataset::new(name, classify(&columns), columns, rows, metadata)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dataset::model::{ColumnType, DatasetType};

  fn text(s: &str) -> Cell {
    Cell::Text(s.to_string())
  }

  #[test]
  fn test_csv_numeric_columns() {
    let dataset = import_csv("sample", "a,b\n1,2\n3,4").unwrap();
    assert_eq!(
      dataset.columns,
      vec![
        Column::new("a", ColumnType::Numeric),
        Column::new("b", ColumnType::Numeric)
      ]
    );
    assert_eq!(
      dataset.rows,
      vec![vec![text("1"), text("2")], vec![text("3"), text("4")]]
    );
    assert_eq!(dataset.dataset_type, DatasetType::Numeric);
    assert_eq!(dataset.metadata["source"], "csv_import");
    assert_eq!(dataset.metadata["row_count"], 2);
  }

  #[test]
  fn test_csv_header_only_fails() {
    let err = import_csv("empty", "a,b\n\n  \n").unwrap_err();
    assert!(err
      .to_string()
      .contains("must have at least a header and one data row"));
  }

  #[test]
  fn test_csv_ragged_rows_and_whitespace() {
    let dataset = import_csv("ragged", " ts , temp \r\n2024-01-01, 20.5\r\n2024-01-02\r\n").unwrap();
    assert_eq!(dataset.column_names(), vec!["ts", "temp"]);
    assert_eq!(dataset.rows[0], vec![text("2024-01-01"), text("20.5")]);
    assert_eq!(dataset.rows[1], vec![text("2024-01-02"), text("")]);
    assert_eq!(dataset.columns[0].column_type, ColumnType::Timestamp);
    assert_eq!(dataset.dataset_type, DatasetType::TimeSeries);
  }

  #[test]
  fn test_csv_row_cap() {
    let mut csv = String::from("n\n");
    for i in 0..1500 {
      csv.push_str(&format!("{}\n", i));
    }
    let dataset = import_csv("big", &csv).unwrap();
    assert_eq!(dataset.rows.len(), MAX_ROWS);
    assert_eq!(dataset.rows[999], vec![text("999")]);
  }

  #[test]
  fn test_json_array_of_rows() {
    let dataset = import_json(
      "machines",
      r#"[{"name":"Press","load":71.5,"on":true},{"name":"Lathe","load":40}]"#,
    )
    .unwrap();
    assert_eq!(dataset.column_names(), vec!["name", "load", "on"]);
    assert_eq!(dataset.columns[1].column_type, ColumnType::Numeric);
    assert_eq!(dataset.columns[2].column_type, ColumnType::Boolean);
    assert_eq!(dataset.rows[1][2], Cell::Null);
    assert_eq!(dataset.rows[1][1], Cell::Number(40.0));
  }

  #[test]
  fn test_json_declared_columns() {
    let dataset = import_json(
      "declared",
      r#"{"columns":[{"name":"line","type":"categorical"},{"name":"units","type":"numeric"}],
          "rows":[{"line":"L1","units":5},["L2",7]]}"#,
    )
    .unwrap();
    assert_eq!(dataset.columns[0].column_type, ColumnType::Categorical);
    assert_eq!(dataset.dataset_type, DatasetType::Mixed);
    assert_eq!(dataset.rows[1], vec![text("L2"), Cell::Number(7.0)]);
  }

  #[test]
  fn test_json_row_cap() {
    let objects: Vec<serde_json::Value> = (0..1200).map(|i| json!({ "n": i })).collect();
    let dataset = import_json("objects", &json!(objects).to_string()).unwrap();
    assert_eq!(dataset.rows.len(), MAX_ROWS);
    assert_eq!(dataset.rows[999], vec![Cell::Number(999.0)]);

    let arrays: Vec<serde_json::Value> = (0..1200).map(|i| json!([i])).collect();
    let declared = json!({ "columns": [{ "name": "n", "type": "numeric" }], "rows": arrays });
    let dataset = import_json("declared", &declared.to_string()).unwrap();
    assert_eq!(dataset.rows.len(), MAX_ROWS);
    assert_eq!(dataset.rows.last(), Some(&vec![Cell::Number(999.0)]));
  }

  #[test]
  fn test_json_rejects_other_shapes() {
    assert!(matches!(
      import_json("x", r#"{"data":[]}"#),
      Err(DatasetError::InvalidJsonFormat)
    ));
    assert!(matches!(
      import_json("x", "[1,2]"),
      Err(DatasetError::InvalidJsonFormat)
    ));
    let err = import_json("x", "{not json").unwrap_err();
    assert!(err.to_string().starts_with("JSON parse error:"));
  }

  #[test]
  fn test_import_file_dispatch() {
    let dir = std::env::temp_dir().join(format!("imcs-import-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let csv = dir.join("line_speed.CSV");
    std::fs::write(&csv, "speed\n10\n").unwrap();
    let dataset = import_file(&csv).unwrap();
    assert_eq!(dataset.name, "line_speed");

    let xlsx = dir.join("report.xlsx");
    std::fs::write(&xlsx, "").unwrap();
    assert!(matches!(
      import_file(&xlsx),
      Err(DatasetError::UnsupportedFileType(_))
    ));

    let _ = std::fs::remove_dir_all(&dir);
  }
}
