//! The fetch worker: request interception, lifecycle, strategy dispatch.

pub mod push;
pub mod router;
pub mod strategies;

pub use router::{FetchRequest, RouteClass, RouteDecision, RouteTable};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use color_eyre::Result;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheStore, CacheVersion, PartitionRole, RequestKey, Served, Snapshot};
use crate::config::Config;
use crate::net::HttpClient;

/// How the worker reaches the network. Abstracted so strategy dispatch can
/// be tested without a server.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, request: &FetchRequest) -> Result<Snapshot>;
}

#[async_trait]
impl Fetcher for HttpClient {
  async fn fetch(&self, request: &FetchRequest) -> Result<Snapshot> {
    HttpClient::fetch(self, request).await
  }
}

/// Outcome of an install pass. Individual fetch failures are skipped, so a
/// flaky connection during install degrades the precache instead of
/// aborting it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallReport {
  pub attempted: usize,
  pub cached: usize,
  pub failed: usize,
}

/// Intercepts requests and serves them through the configured strategies.
pub struct FetchWorker<S, F> {
  store: Arc<S>,
  fetcher: Arc<F>,
  version: CacheVersion,
  routes: RouteTable,
  origin: Url,
  precache: Vec<String>,
  offline_key: RequestKey,
  timeout: Duration,
}

impl<S, F> FetchWorker<S, F>
where
  S: CacheStore + 'static,
  F: Fetcher + 'static,
{
  pub fn new(store: Arc<S>, fetcher: Arc<F>, origin: &Url, config: &Config) -> Result<Self> {
    let offline_url = origin.join(&config.cache.offline_path)?;

    Ok(Self {
      store,
      fetcher,
      version: CacheVersion::new(&config.cache.version),
      routes: RouteTable::new(origin, &config.routes),
      origin: origin.clone(),
      precache: config.cache.precache.clone(),
      offline_key: RequestKey::get(offline_url.as_str()),
      timeout: Duration::from_secs(config.network.request_timeout_secs),
    })
  }

  /// Fetch the precache list into the static partition. Failures are
  /// logged and skipped.
  pub async fn install(&self) -> Result<InstallReport> {
    let partition = self.version.partition(PartitionRole::Static);
    let mut report = InstallReport {
      attempted: self.precache.len(),
      ..Default::default()
    };

    for path in &self.precache {
      let url = match self.origin.join(path) {
        Ok(url) => url,
        Err(e) => {
          warn!("Skipping bad precache path {}: {}", path, e);
          report.failed += 1;
          continue;
        }
      };

      let request = FetchRequest::get(url.clone());
      match self.fetcher.fetch(&request).await {
        Ok(snapshot) if snapshot.is_success() => {
          let key = RequestKey::get(url.as_str());
          match self.store.put(&partition, &key, &snapshot) {
            Ok(()) => report.cached += 1,
            Err(e) => {
              warn!("Failed to store precached {}: {}", path, e);
              report.failed += 1;
            }
          }
        }
        Ok(snapshot) => {
          warn!("Precache of {} got status {}, skipping", path, snapshot.status);
          report.failed += 1;
        }
        Err(e) => {
          warn!("Precache of {} failed: {}", path, e);
          report.failed += 1;
        }
      }
    }

    info!(
      "Install complete: {}/{} precached into {} ({} skipped)",
      report.cached, report.attempted, partition, report.failed
    );
    Ok(report)
  }

  /// Delete every partition the current version does not retain. Returns
  /// the names of the partitions removed.
  pub async fn activate(&self) -> Result<Vec<String>> {
    let mut deleted = Vec::new();

    for partition in self.store.partitions()? {
      if !self.version.retains(&partition) {
        self.store.delete_partition(&partition)?;
        info!("Deleted superseded cache partition {}", partition);
        deleted.push(partition);
      }
    }

    Ok(deleted)
  }

  /// Serve an intercepted request through the strategy its route calls for.
  pub async fn handle(&self, request: &FetchRequest) -> Result<Served> {
    let class = match self.routes.classify(request) {
      RouteDecision::Passthrough => {
        debug!("Passing through {} {}", request.method, request.url);
        let snapshot = self.fetcher.fetch(request).await?;
        return Ok(Served::from_network(snapshot));
      }
      RouteDecision::Handle(class) => class,
    };

    let key = RequestKey::new(&request.method, request.url.as_str());
    let fetch = self.fetch_closure(request.clone());

    let served = match class {
      RouteClass::Api => {
        let partition = self.version.partition(PartitionRole::Api);
        strategies::network_first_api(self.store.clone(), partition, key, self.timeout, fetch)
          .await
      }
      RouteClass::Auth => strategies::network_only(&key, fetch).await,
      RouteClass::DynamicRoute | RouteClass::Navigation => {
        let partition = self.version.partition(PartitionRole::Dynamic);
        let static_partition = self.version.partition(PartitionRole::Static);
        strategies::network_first_page(
          self.store.clone(),
          partition,
          key,
          &self.offline_key,
          &static_partition,
          self.timeout,
          fetch,
        )
        .await
      }
      RouteClass::StaticAsset => {
        let partition = self.version.partition(PartitionRole::Static);
        strategies::cache_first(self.store.clone(), partition, key, fetch).await
      }
      RouteClass::Default => {
        let partition = self.version.partition(PartitionRole::Dynamic);
        strategies::stale_while_revalidate(self.store.clone(), partition, key, fetch).await
      }
    };

    Ok(served)
  }

  fn fetch_closure(
    &self,
    request: FetchRequest,
  ) -> impl FnOnce() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Snapshot>> + Send>>
       + Send
       + 'static {
    let fetcher = self.fetcher.clone();
    move || Box::pin(async move { fetcher.fetch(&request).await })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::traits::ServedFrom;
  use crate::cache::SqliteStore;
  use color_eyre::eyre::eyre;
  use std::collections::HashMap;
  use std::sync::Mutex;

  /// Fetcher serving canned snapshots by URL; everything else fails.
  struct StubFetcher {
    responses: Mutex<HashMap<String, Snapshot>>,
    calls: Mutex<Vec<String>>,
  }

  impl StubFetcher {
    fn new() -> Self {
      Self {
        responses: Mutex::new(HashMap::new()),
        calls: Mutex::new(Vec::new()),
      }
    }

    fn respond(&self, url: &str, snapshot: Snapshot) {
      self.responses.lock().unwrap().insert(url.to_string(), snapshot);
    }

    fn calls(&self) -> Vec<String> {
      self.calls.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Snapshot> {
      self.calls.lock().unwrap().push(request.url.to_string());
      self
        .responses
        .lock()
        .unwrap()
        .get(request.url.as_str())
        .cloned()
        .ok_or_else(|| eyre!("unreachable: {}", request.url))
    }
  }

  fn config() -> Config {
    serde_yaml::from_str("server:\n  url: https://tracker.example.com\n").unwrap()
  }

  fn worker() -> (FetchWorker<SqliteStore, StubFetcher>, Arc<SqliteStore>, Arc<StubFetcher>) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let fetcher = Arc::new(StubFetcher::new());
    let origin = Url::parse("https://tracker.example.com").unwrap();
    let worker = FetchWorker::new(store.clone(), fetcher.clone(), &origin, &config()).unwrap();
    (worker, store, fetcher)
  }

  fn html(body: &[u8]) -> Snapshot {
    Snapshot::new(
      200,
      vec![("content-type".to_string(), "text/html".to_string())],
      body.to_vec(),
    )
  }

  #[tokio::test]
  async fn install_precaches_reachable_resources_and_skips_failures() {
    let (worker, store, fetcher) = worker();
    // Only two of the ten precache entries are reachable
    fetcher.respond("https://tracker.example.com/", html(b"home"));
    fetcher.respond("https://tracker.example.com/offline/", html(b"offline"));

    let report = worker.install().await.unwrap();

    assert_eq!(report.attempted, 10);
    assert_eq!(report.cached, 2);
    assert_eq!(report.failed, 8);

    let key = RequestKey::get("https://tracker.example.com/offline/");
    assert!(store.get("triptracker-v3-static", &key).unwrap().is_some());
  }

  #[tokio::test]
  async fn activate_deletes_superseded_partitions_only() {
    let (worker, store, _) = worker();
    let key = RequestKey::get("https://tracker.example.com/");
    store.put("triptracker-v2-static", &key, &html(b"old")).unwrap();
    store.put("triptracker-v2-api", &key, &html(b"old")).unwrap();
    store.put("triptracker-v3-static", &key, &html(b"new")).unwrap();

    let mut deleted = worker.activate().await.unwrap();
    deleted.sort();

    assert_eq!(deleted, vec!["triptracker-v2-api", "triptracker-v2-static"]);
    assert!(store.get("triptracker-v3-static", &key).unwrap().is_some());
  }

  #[tokio::test]
  async fn api_requests_land_in_the_api_partition() {
    let (worker, store, fetcher) = worker();
    fetcher.respond(
      "https://tracker.example.com/api/events/",
      Snapshot::new(200, Vec::new(), b"[]".to_vec()),
    );

    let request =
      FetchRequest::get(Url::parse("https://tracker.example.com/api/events/").unwrap());
    let served = worker.handle(&request).await.unwrap();

    assert_eq!(served.source, ServedFrom::Network);
    let key = RequestKey::get("https://tracker.example.com/api/events/");
    assert!(store.get("triptracker-v3-api", &key).unwrap().is_some());
    assert!(store.get("triptracker-v3-dynamic", &key).unwrap().is_none());
  }

  #[tokio::test]
  async fn offline_navigation_falls_back_to_the_offline_page() {
    let (worker, store, _) = worker();
    let offline_key = RequestKey::get("https://tracker.example.com/offline/");
    store
      .put("triptracker-v3-static", &offline_key, &html(b"<h1>Offline</h1>"))
      .unwrap();

    let request =
      FetchRequest::navigation(Url::parse("https://tracker.example.com/vehicles/4/").unwrap());
    let served = worker.handle(&request).await.unwrap();

    assert_eq!(served.source, ServedFrom::OfflinePage);
    assert_eq!(served.snapshot.body, b"<h1>Offline</h1>");
  }

  #[tokio::test]
  async fn offline_api_request_synthesizes_json_error() {
    let (worker, _, _) = worker();

    let request =
      FetchRequest::get(Url::parse("https://tracker.example.com/api/todos/").unwrap());
    let served = worker.handle(&request).await.unwrap();

    assert_eq!(served.source, ServedFrom::Synthesized);
    assert_eq!(served.snapshot.status, 503);
    assert_eq!(served.snapshot.header("content-type"), Some("application/json"));
  }

  #[tokio::test]
  async fn offline_auth_request_redirects_to_root() {
    let (worker, _, _) = worker();

    let request =
      FetchRequest::navigation(Url::parse("https://tracker.example.com/accounts/login/").unwrap());
    let served = worker.handle(&request).await.unwrap();

    assert_eq!(served.snapshot.status, 302);
    assert_eq!(served.snapshot.header("location"), Some("/"));
  }

  #[tokio::test]
  async fn static_asset_hit_is_served_without_waiting_on_network() {
    let (worker, store, fetcher) = worker();
    let url = "https://tracker.example.com/static/css/styles.css";
    let key = RequestKey::get(url);
    store
      .put("triptracker-v3-static", &key, &html(b"body{}"))
      .unwrap();

    let request = FetchRequest::get(Url::parse(url).unwrap());
    let served = worker.handle(&request).await.unwrap();

    assert_eq!(served.source, ServedFrom::Cache);
    // The background refresh still goes to the network
    for _ in 0..10 {
      tokio::task::yield_now().await;
    }
    assert_eq!(fetcher.calls(), vec![url.to_string()]);
  }

  #[tokio::test]
  async fn cross_origin_requests_are_never_cached() {
    let (worker, store, fetcher) = worker();
    let url = "https://cdn.other.example/lib.js";
    fetcher.respond(url, html(b"lib"));

    let request = FetchRequest::get(Url::parse(url).unwrap());
    let served = worker.handle(&request).await.unwrap();

    assert_eq!(served.source, ServedFrom::Network);
    assert!(store.partitions().unwrap().is_empty());
  }
}
