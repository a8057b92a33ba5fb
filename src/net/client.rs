//! HTTP client for the TripTracker server.

use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;

use crate::cache::Snapshot;
use crate::config::Config;
use crate::worker::FetchRequest;

/// Thin wrapper around [`reqwest::Client`] bound to the server base URL.
///
/// Redirects are not followed: strategies need to see 3xx responses as-is to
/// avoid caching them.
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
  base: Url,
  health_path: String,
}

impl HttpClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.server.url)
      .map_err(|e| eyre!("Invalid server URL {}: {}", config.server.url, e))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.network.request_timeout_secs))
      .redirect(Policy::none())
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      health_path: config.server.health_path.clone(),
    })
  }

  pub fn base(&self) -> &Url {
    &self.base
  }

  /// Resolve a path against the server base URL.
  pub fn url_for(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid path {}: {}", path, e))
  }

  /// Perform an intercepted request against the network.
  pub async fn fetch(&self, request: &FetchRequest) -> Result<Snapshot> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", request.url, e))?;

    Self::snapshot(response).await
  }

  /// Check connectivity against the health endpoint. Any reachable server
  /// counts, even one answering with an error status.
  pub async fn probe(&self) -> bool {
    let url = match self.url_for(&self.health_path) {
      Ok(url) => url,
      Err(e) => {
        debug!("Bad health URL: {}", e);
        return false;
      }
    };

    let result = self
      .client
      .head(url)
      .header("Cache-Control", "no-cache")
      .send()
      .await;

    match result {
      Ok(_) => true,
      Err(e) => {
        debug!("Health probe failed: {}", e);
        false
      }
    }
  }

  /// Replay a queued todo toggle.
  pub async fn toggle_todo(&self, id: i64) -> Result<Snapshot> {
    let url = self.url_for(&format!("/todos/{}/toggle/", id))?;

    let response = self
      .client
      .post(url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to toggle todo {}: {}", id, e))?;

    Self::snapshot(response).await
  }

  /// Replay a queued event creation.
  pub async fn create_event(&self, payload: &serde_json::Value) -> Result<Snapshot> {
    let url = self.url_for("/api/events/")?;

    let response = self
      .client
      .post(url)
      .json(payload)
      .send()
      .await
      .map_err(|e| eyre!("Failed to create event: {}", e))?;

    Self::snapshot(response).await
  }

  async fn snapshot(response: reqwest::Response) -> Result<Snapshot> {
    let status = response.status().as_u16();

    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body: {}", e))?
      .to_vec();

    Ok(Snapshot::new(status, headers, body))
  }
}
