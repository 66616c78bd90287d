//! Request/response types seen by the router, and the network behind it.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

/// An outgoing request, addressed by path relative to the server root.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  /// Path plus optional query, e.g. `/api/alerts?ack=0`
  pub url: String,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
  /// Bypass intermediate HTTP caches
  pub no_store: bool,
}

impl Request {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: Method::GET,
      url: url.into(),
      headers: Vec::new(),
      body: None,
      no_store: false,
    }
  }

  /// Request with a JSON body
  pub fn json<T: Serialize>(method: Method, url: impl Into<String>, body: &T) -> Result<Self> {
    let body = serde_json::to_vec(body).map_err(|e| eyre!("Failed to encode request body: {}", e))?;
    Ok(Self {
      method,
      url: url.into(),
      headers: vec![("Content-Type".to_string(), "application/json".to_string())],
      body: Some(body),
      no_store: false,
    })
  }

  pub fn with_no_store(mut self) -> Self {
    self.no_store = true;
    self
  }

  /// Path component without the query string
  pub fn path(&self) -> &str {
    self.url.split(['?', '#']).next().unwrap_or(&self.url)
  }

  pub fn is_get(&self) -> bool {
    self.method == Method::GET
  }
}

/// A buffered response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// Synthesized reply for API calls made while offline with nothing cached
  pub fn offline_json() -> Self {
    Self {
      status: 503,
      headers: vec![("Content-Type".to_string(), "application/json".to_string())],
      body: br#"{"error":"offline"}"#.to_vec(),
    }
  }

  /// Synthesized reply for non-API requests that could not be served at all
  pub fn unavailable() -> Self {
    Self::new(503, Vec::new())
  }

  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
    serde_json::from_slice(&self.body).map_err(|e| eyre!("Failed to decode response body: {}", e))
  }
}

/// Transport used by the router. An `Err` means no response was received at all.
pub trait Network: Send + Sync {
  fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response>>;
}

/// Network backed by reqwest against a fixed server root.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpNetwork {
  pub fn new(client: reqwest::Client, base_url: Url) -> Self {
    Self { client, base_url }
  }
}

impl Network for HttpNetwork {
  fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response>> {
    let client = self.client.clone();
    let target = self.base_url.join(&request.url);

    Box::pin(async move {
      let target = target.map_err(|e| eyre!("Invalid request URL {}: {}", request.url, e))?;

      let mut builder = client.request(request.method.clone(), target);
      for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
      }
      if request.no_store {
        builder = builder.header(reqwest::header::CACHE_CONTROL, "no-store");
      }
      if let Some(body) = request.body {
        builder = builder.body(body);
      }

      let response = builder
        .send()
        .await
        .map_err(|e| eyre!("Request to {} failed: {}", request.url, e))?;

      let status = response.status().as_u16();
      let headers = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
      let body = response
        .bytes()
        .await
        .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?
        .to_vec();

      Ok(Response {
        status,
        headers,
        body,
      })
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_request_path_strips_query() {
    assert_eq!(Request::get("/api/alerts?ack=0").path(), "/api/alerts");
    assert_eq!(Request::get("/chart/summary.png").path(), "/chart/summary.png");
  }

  #[test]
  fn test_offline_json_payload() {
    let response = Response::offline_json();
    assert!(!response.is_ok());
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body, serde_json::json!({"error": "offline"}));
    assert_eq!(response.header("content-type"), Some("application/json"));
  }

  #[test]
  fn test_json_request_sets_content_type() {
    let request = Request::json(Method::POST, "/api/maintenance", &serde_json::json!({"a": 1})).unwrap();
    assert!(!request.is_get());
    assert_eq!(request.body.as_deref(), Some(&br#"{"a":1}"#[..]));
    assert_eq!(request.headers[0].1, "application/json");
  }
}
