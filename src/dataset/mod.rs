//! Tabular dataset pipeline: import, type inference, filter/transform,
//! synthetic generation and durable storage.

mod error;
mod generate;
mod import;
mod infer;
mod model;
mod ops;
mod store;

pub use error::DatasetError;
pub use generate::{generate, GenerateRequest, Pattern};
pub use import::{import_csv, import_file, import_json, MAX_ROWS};
pub use infer::classify;
pub use model::{format_number, Cell, Column, ColumnType, Dataset, DatasetType};
pub use ops::{
  filter, transform, AggregateFunction, Aggregation, CalcOperation, Filter, FilterOperator,
  Transform,
};
pub use store::DatasetStore;
