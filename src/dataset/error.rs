use thiserror::Error;

/// Failures of the dataset pipeline. These are user-facing: the message is
/// shown as-is in the notice line.
#[derive(Error, Debug)]
pub enum DatasetError {
  #[error("CSV file must have at least a header and one data row")]
  CsvTooShort,

  #[error("Invalid JSON format")]
  InvalidJsonFormat,

  #[error("JSON parse error: {0}")]
  JsonParse(String),

  #[error("Unsupported file type '{0}'. Please use CSV or JSON.")]
  UnsupportedFileType(String),

  #[error("Failed to read {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("Unknown column: {0}")]
  UnknownColumn(String),

  #[error("Invalid filter value for {operator}: {reason}")]
  InvalidFilter {
    operator: &'static str,
    reason: String,
  },

  #[error("Calculation needs at least one source column")]
  NoSourceColumns,

  #[error("Aggregation must be the last transform")]
  TransformAfterAggregate,
}
