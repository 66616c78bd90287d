use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::api::types::{
  Alert, Machine, MachineDetail, MaintenanceTask, MutationReply, NewMachine, NewTask, Record,
  RecordTable, Summary, UploadResult,
};
use crate::offline::{Request, Response, ServiceWorker};

/// Backend client. Every request except multipart uploads goes through the
/// request router.
#[derive(Clone)]
pub struct ImcsClient {
  worker: Arc<ServiceWorker>,
  http: reqwest::Client,
  base_url: Url,
}

impl ImcsClient {
  pub fn new(worker: Arc<ServiceWorker>, http: reqwest::Client, base_url: Url) -> Self {
    Self {
      worker,
      http,
      base_url,
    }
  }

  /// Single-attempt JSON GET with HTTP caching disabled.
  ///
  /// Any failure (transport, status, body) yields `None`.
  pub async fn fetch_json_low<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
    let response = self.worker.fetch(Request::get(path).with_no_store()).await;
    if !response.is_ok() {
      debug!(path, status = response.status, "fetch returned no data");
      return None;
    }
    match response.json() {
      Ok(value) => Some(value),
      Err(e) => {
        debug!(path, error = %e, "fetch returned an unreadable body");
        None
      }
    }
  }

  pub async fn summary(&self) -> Option<Summary> {
    self.fetch_json_low("/api/summary").await
  }

  pub async fn machines(&self) -> Option<Vec<Machine>> {
    self.fetch_json_low("/api/machines").await
  }

  pub async fn machine(&self, id: u64) -> Option<MachineDetail> {
    self.fetch_json_low(&format!("/api/machines/{}", id)).await
  }

  pub async fn alerts(&self) -> Option<Vec<Alert>> {
    self.fetch_json_low("/api/alerts?ack=0").await
  }

  pub async fn maintenance(&self) -> Option<Vec<MaintenanceTask>> {
    self.fetch_json_low("/api/maintenance").await
  }

  pub async fn records(&self, table: RecordTable) -> Option<Vec<Record>> {
    self
      .fetch_json_low(&format!("/api/data/{}/all", table.as_str()))
      .await
  }

  pub async fn ack_alert(&self, id: u64) -> Result<()> {
    let request = Request {
      method: Method::POST,
      ..Request::get(format!("/api/alerts/{}/ack", id))
    };
    self.mutate(request, "acknowledge alert").await
  }

  pub async fn create_task(&self, task: &NewTask) -> Result<()> {
    self
      .send_json(Method::POST, "/api/maintenance", task, "create task")
      .await
  }

  pub async fn create_machine(&self, machine: &NewMachine) -> Result<()> {
    self
      .send_json(Method::POST, "/api/machines", machine, "add machine")
      .await
  }

  pub async fn update_record(&self, table: RecordTable, id: &str, fields: &Record) -> Result<()> {
    let path = format!("/api/data/{}/{}", table.as_str(), id);
    self.send_json(Method::PUT, &path, fields, "save record").await
  }

  pub async fn delete_record(&self, table: RecordTable, id: &str) -> Result<()> {
    let request = Request {
      method: Method::DELETE,
      ..Request::get(format!("/api/data/{}/{}", table.as_str(), id))
    };
    self.mutate(request, "delete record").await
  }

  async fn send_json<T: Serialize>(
    &self,
    method: Method,
    path: &str,
    body: &T,
    action: &str,
  ) -> Result<()> {
    let request = Request::json(method, path, body)?;
    self.mutate(request, action).await
  }

  /// Run a mutation. Nothing is retried; a failed reply becomes an error
  /// carrying the server's message when there is one.
  async fn mutate(&self, request: Request, action: &str) -> Result<()> {
    let url = request.url.clone();
    let response = self.worker.fetch(request).await;
    let reply: MutationReply = response.json().unwrap_or_default();

    if response.is_ok() && reply.succeeded() {
      info!(url = %url, "{} succeeded", action);
      return Ok(());
    }

    let reason = reply.error.unwrap_or_else(|| describe_status(&response));
    Err(eyre!("Failed to {}: {}", action, reason))
  }

  /// Fetch a server-rendered chart image.
  pub async fn chart(&self, path: &str) -> Option<Vec<u8>> {
    let response = self.worker.fetch(Request::get(path)).await;
    if response.is_ok() && !response.body.is_empty() {
      debug!(
        path,
        content_type = response.header("content-type").unwrap_or("-"),
        bytes = response.body.len(),
        "chart fetched"
      );
      Some(response.body)
    } else {
      debug!(path, status = response.status, "chart unavailable");
      None
    }
  }

  /// Fetch a chart image and write it to `dest`.
  pub async fn save_chart(&self, path: &str, dest: &Path) -> Result<usize> {
    let bytes = self
      .chart(path)
      .await
      .ok_or_else(|| eyre!("Chart {} is not available offline", path))?;
    tokio::fs::write(dest, &bytes)
      .await
      .map_err(|e| eyre!("Failed to write {}: {}", dest.display(), e))?;
    Ok(bytes.len())
  }

  /// Upload a CSV file for server-side ingest (`POST /api/upload-csv`).
  pub async fn upload_csv(&self, path: &Path) -> Result<UploadResult> {
    let is_csv = path
      .extension()
      .and_then(|e| e.to_str())
      .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
      return Err(eyre!("Please choose a CSV file"));
    }

    let bytes = tokio::fs::read(path)
      .await
      .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
    let file_name = path
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or("upload.csv")
      .to_string();

    let part = reqwest::multipart::Part::bytes(bytes)
      .file_name(file_name)
      .mime_str("text/csv")
      .map_err(|e| eyre!("Invalid upload content type: {}", e))?;
    let form = reqwest::multipart::Form::new().part("file", part);

    let url = self
      .base_url
      .join("/api/upload-csv")
      .map_err(|e| eyre!("Invalid upload URL: {}", e))?;
    let response = self
      .http
      .post(url)
      .multipart(form)
      .send()
      .await
      .map_err(|e| eyre!("Upload failed: {}", e))?;

    let result: UploadResult = response
      .json()
      .await
      .map_err(|e| eyre!("Unreadable upload reply: {}", e))?;
    if !result.success {
      return Err(eyre!(
        "Upload rejected: {}",
        result.error.as_deref().unwrap_or("unknown error")
      ));
    }
    Ok(result)
  }
}

fn describe_status(response: &Response) -> String {
  match response.status {
    503 => "offline or server unavailable".to_string(),
    status => format!("server returned HTTP {}", status),
  }
}
