//! Core types for the response cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An immutable capture of an HTTP response at the time of storage.
///
/// Two partitions may hold independent snapshots of the same logical
/// resource; a snapshot is owned by the partition row that stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Snapshot {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn is_redirect(&self) -> bool {
    (300..400).contains(&self.status)
  }

  /// Look up a header value, case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Synthesized response for API requests that fail with nothing cached.
  /// Fixed shape: `{"error": string}`.
  pub fn offline_api_error() -> Self {
    let body = serde_json::json!({
      "error": "You are currently offline. Please try again when you have a network connection."
    });
    Self {
      status: 503,
      headers: vec![("content-type".to_string(), "application/json".to_string())],
      body: body.to_string().into_bytes(),
    }
  }

  /// Synthesized response when a fetch fails and no fallback exists.
  pub fn unavailable() -> Self {
    Self {
      status: 503,
      headers: vec![("content-type".to_string(), "text/plain".to_string())],
      body: b"Network error occurred".to_vec(),
    }
  }

  /// Synthesized redirect, used when an auth request fails offline.
  pub fn redirect_to(location: &str) -> Self {
    Self {
      status: 302,
      headers: vec![("location".to_string(), location.to_string())],
      body: Vec::new(),
    }
  }
}

/// Cache key for a request: method plus full URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &str) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url: url.to_string(),
    }
  }

  pub fn get(url: &str) -> Self {
    Self::new("GET", url)
  }

  /// SHA256 hash for stable, fixed-length storage keys.
  pub fn hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human-readable form, kept alongside the hash for diagnostics.
  pub fn description(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

/// A snapshot read back from a partition, with its storage timestamp.
#[derive(Debug, Clone)]
pub struct CachedSnapshot {
  pub snapshot: Snapshot,
  pub cached_at: DateTime<Utc>,
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
  /// Fresh data from network
  Network,
  /// Stored snapshot
  Cache,
  /// The designated offline fallback page
  OfflinePage,
  /// A response synthesized locally (offline error payload, auth redirect)
  Synthesized,
}

/// Result of a strategy invocation: the response plus its provenance.
#[derive(Debug, Clone)]
pub struct Served {
  pub snapshot: Snapshot,
  pub source: ServedFrom,
}

impl Served {
  pub fn from_network(snapshot: Snapshot) -> Self {
    Self {
      snapshot,
      source: ServedFrom::Network,
    }
  }

  pub fn from_cache(snapshot: Snapshot) -> Self {
    Self {
      snapshot,
      source: ServedFrom::Cache,
    }
  }

  pub fn offline_page(snapshot: Snapshot) -> Self {
    Self {
      snapshot,
      source: ServedFrom::OfflinePage,
    }
  }

  pub fn synthesized(snapshot: Snapshot) -> Self {
    Self {
      snapshot,
      source: ServedFrom::Synthesized,
    }
  }
}
