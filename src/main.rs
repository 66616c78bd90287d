mod api;
mod app;
mod cache;
mod commands;
mod config;
mod dataset;
mod db;
mod event;
mod feed;
mod insights;
mod logging;
mod offline;
mod query;
mod services;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::api::ImcsClient;
use crate::cache::{KeyValueStore, LocalCache, NoopStore, SqliteStore};
use crate::config::Config;
use crate::dataset::{Dataset, DatasetStore, DatasetType, GenerateRequest, Pattern};
use crate::db::Database;
use crate::offline::{HttpNetwork, ServiceWorker, SqliteResponseStore};
use crate::services::Services;

#[derive(Parser, Debug)]
#[command(name = "imcs")]
#[command(about = "An offline-first terminal dashboard for industrial machine monitoring")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./imcs.yaml, then $XDG_CONFIG_HOME/imcs/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// View to open at startup (dashboard, machines, alerts, maintenance, datasets, records)
  #[arg(short, long)]
  view: Option<String>,

  #[command(subcommand)]
  command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Import a CSV or JSON file into the local dataset store
  Import { file: PathBuf },
  /// List stored datasets
  Datasets {
    /// Only datasets of this type
    #[arg(short = 't', long = "type")]
    dataset_type: Option<String>,
  },
  /// Print a stored dataset's schema and first rows
  Show {
    id: String,
    #[arg(short = 'n', long, default_value_t = 10)]
    rows: usize,
  },
  /// Generate a synthetic time series dataset
  Generate {
    #[arg(default_value = "Generated")]
    name: String,
    #[arg(short, long, default_value_t = 100)]
    rows: usize,
    /// linear, random, sine, trend_up or trend_down
    #[arg(short, long, default_value = "linear")]
    pattern: String,
    /// Dataset type (classified from the columns when omitted)
    #[arg(short = 't', long = "type")]
    dataset_type: Option<String>,
  },
  /// Upload a CSV file to the server for ingest
  Upload { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let data_dir = config.data_dir()?;
  let _log_guard = logging::init(&data_dir)?;

  let db = Arc::new(Database::open(&data_dir.join("imcs.db"))?);
  let services = build_services(config, db).await?;

  match args.command {
    None => {
      let view = args
        .view
        .or_else(|| services.config.default_view.clone())
        .unwrap_or_else(|| "dashboard".to_string());
      info!(view = %view, server = %services.config.server.url, "starting");
      let mut app = app::App::new(services, &view)?;
      app.run().await?;
    }
    Some(Cmd::Import { file }) => import(&services.datasets, &file).await?,
    Some(Cmd::Datasets { dataset_type }) => {
      let dataset_type = dataset_type
        .map(|t| t.parse::<DatasetType>().map_err(|e| eyre!(e)))
        .transpose()?;
      list_datasets(&services.datasets, dataset_type).await?
    }
    Some(Cmd::Show { id, rows }) => show_dataset(&services.datasets, &id, rows).await?,
    Some(Cmd::Generate {
      name,
      rows,
      pattern,
      dataset_type,
    }) => {
      let pattern: Pattern = pattern.parse().map_err(|e: String| eyre!(e))?;
      let mut request = GenerateRequest::time_series(name, rows, pattern);
      request.dataset_type = dataset_type
        .map(|t| t.parse::<DatasetType>().map_err(|e| eyre!(e)))
        .transpose()?;
      let dataset = dataset::generate(&request);
      services.datasets.put(&dataset).await?;
      println!("Generated {}", describe(&dataset));
    }
    Some(Cmd::Upload { file }) => {
      let result = services.api.upload_csv(&file).await?;
      match (result.success, result.error) {
        (true, _) => println!("Uploaded {}", file.display()),
        (false, error) => {
          return Err(eyre!(
            "Failed to upload {}: {}",
            file.display(),
            error.unwrap_or_else(|| "rejected by server".to_string())
          ))
        }
      }
    }
  }

  Ok(())
}

/// Wire the request router, caches and stores over one database.
async fn build_services(config: Config, db: Arc<Database>) -> Result<Services> {
  let base_url = Url::parse(&config.server.url)
    .map_err(|e| eyre!("Invalid server url '{}': {}", config.server.url, e))?;
  let http = reqwest::Client::builder()
    .build()
    .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

  let worker = ServiceWorker::new(
    &config.offline,
    Arc::new(SqliteResponseStore::new(db.clone())),
    Arc::new(HttpNetwork::new(http.clone(), base_url.clone())),
  )
  .start()
  .await;
  info!(state = %worker.state(), "request router started");

  let store: Arc<dyn KeyValueStore> = if config.cache.enabled {
    Arc::new(SqliteStore::new(db.clone()))
  } else {
    Arc::new(NoopStore)
  };

  Ok(Services::new(
    ImcsClient::new(worker, http, base_url),
    LocalCache::new(store),
    DatasetStore::new(db),
    Arc::new(config),
  ))
}

async fn import(store: &DatasetStore, file: &Path) -> Result<()> {
  let path = file.to_path_buf();
  let dataset = tokio::task::spawn_blocking(move || dataset::import_file(&path))
    .await
    .map_err(|e| eyre!("Failed to import {}: {}", file.display(), e))??;
  store.put(&dataset).await?;
  println!("Imported {}", describe(&dataset));
  Ok(())
}

async fn list_datasets(store: &DatasetStore, dataset_type: Option<DatasetType>) -> Result<()> {
  let datasets = match dataset_type {
    Some(t) => store.get_by_type(t).await?,
    None => store.get_all().await?,
  };
  if datasets.is_empty() {
    println!("No stored datasets");
  }
  for dataset in &datasets {
    println!("{:<22} {}", dataset.id, describe(dataset));
  }
  Ok(())
}

async fn show_dataset(store: &DatasetStore, id: &str, rows: usize) -> Result<()> {
  let dataset = store
    .get(id)
    .await?
    .ok_or_else(|| eyre!("No stored dataset with id '{}'", id))?;

  println!("{}", describe(&dataset));
  let header: Vec<String> = dataset
    .columns
    .iter()
    .map(|c| format!("{}:{}", c.name, c.column_type.as_str()))
    .collect();
  println!("{}", header.join(","));
  for row in dataset.rows.iter().take(rows) {
    let cells: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
    println!("{}", cells.join(","));
  }
  Ok(())
}

fn describe(dataset: &Dataset) -> String {
  format!(
    "{} [{}] {} rows, {} columns",
    dataset.name,
    dataset.dataset_type,
    dataset.rows.len(),
    dataset.columns.len()
  )
}
