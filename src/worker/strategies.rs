//! Caching strategies.
//!
//! Each strategy is a free async function over a cache store and a fetcher
//! closure. The closure owns the actual network call, so callers decide how
//! requests are made and tests can substitute stubs. Every failure mode has
//! a defined fallback, so strategies return a [`Served`] rather than an
//! error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use tracing::{debug, warn};

use crate::cache::{CacheStore, RequestKey, Served, Snapshot};

/// Serve from cache when possible, refreshing the stored copy in the
/// background. Used for fingerprinted static assets.
pub async fn cache_first<S, F, Fut>(
  store: Arc<S>,
  partition: String,
  key: RequestKey,
  fetch: F,
) -> Served
where
  S: CacheStore + 'static,
  F: FnOnce() -> Fut + Send + 'static,
  Fut: Future<Output = Result<Snapshot>> + Send + 'static,
{
  if let Some(cached) = lookup(store.as_ref(), &partition, &key) {
    refresh_in_background(store, partition, key, fetch);
    return Served::from_cache(cached);
  }

  match fetch().await {
    Ok(snapshot) => {
      if snapshot.is_success() {
        store_snapshot(store.as_ref(), &partition, &key, &snapshot);
      }
      Served::from_network(snapshot)
    }
    Err(e) => {
      debug!("Fetch failed for {}: {}", key.description(), e);
      Served::synthesized(Snapshot::unavailable())
    }
  }
}

/// Try the network first with a timeout, falling back to the cached copy.
/// When neither is available, synthesize the offline API error payload.
/// Used for API requests.
pub async fn network_first_api<S, F, Fut>(
  store: Arc<S>,
  partition: String,
  key: RequestKey,
  timeout: Duration,
  fetch: F,
) -> Served
where
  S: CacheStore + 'static,
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<Snapshot>>,
{
  match fetch_with_timeout(timeout, fetch, &key).await {
    Some(snapshot) => {
      if snapshot.is_success() {
        store_snapshot(store.as_ref(), &partition, &key, &snapshot);
      }
      Served::from_network(snapshot)
    }
    None => match lookup(store.as_ref(), &partition, &key) {
      Some(cached) => Served::from_cache(cached),
      None => Served::synthesized(Snapshot::offline_api_error()),
    },
  }
}

/// Try the network first with a timeout, falling back to the cached copy and
/// then to the offline page. Used for navigations and dynamic routes.
///
/// Redirects and error responses are returned to the caller but never
/// stored, so a cached page is never shadowed by a login redirect.
pub async fn network_first_page<S, F, Fut>(
  store: Arc<S>,
  partition: String,
  key: RequestKey,
  offline_page: &RequestKey,
  static_partition: &str,
  timeout: Duration,
  fetch: F,
) -> Served
where
  S: CacheStore + 'static,
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<Snapshot>>,
{
  match fetch_with_timeout(timeout, fetch, &key).await {
    Some(snapshot) => {
      if snapshot.is_success() && !snapshot.is_redirect() {
        store_snapshot(store.as_ref(), &partition, &key, &snapshot);
      }
      Served::from_network(snapshot)
    }
    None => {
      if let Some(cached) = lookup(store.as_ref(), &partition, &key) {
        return Served::from_cache(cached);
      }
      match lookup(store.as_ref(), static_partition, offline_page) {
        Some(page) => Served::offline_page(page),
        None => Served::synthesized(Snapshot::unavailable()),
      }
    }
  }
}

/// Serve the cached copy immediately and revalidate in the background; on a
/// cache miss, wait for the network. The default strategy.
pub async fn stale_while_revalidate<S, F, Fut>(
  store: Arc<S>,
  partition: String,
  key: RequestKey,
  fetch: F,
) -> Served
where
  S: CacheStore + 'static,
  F: FnOnce() -> Fut + Send + 'static,
  Fut: Future<Output = Result<Snapshot>> + Send + 'static,
{
  if let Some(cached) = lookup(store.as_ref(), &partition, &key) {
    refresh_in_background(store, partition, key, fetch);
    return Served::from_cache(cached);
  }

  match fetch().await {
    Ok(snapshot) => {
      if snapshot.is_success() {
        store_snapshot(store.as_ref(), &partition, &key, &snapshot);
      }
      Served::from_network(snapshot)
    }
    Err(e) => {
      debug!("Fetch failed for {}: {}", key.description(), e);
      Served::synthesized(Snapshot::unavailable())
    }
  }
}

/// Never cache; on failure, synthesize a redirect to the app root. Used for
/// auth pages, where serving a stale login form would be worse than a
/// redirect.
pub async fn network_only<F, Fut>(key: &RequestKey, fetch: F) -> Served
where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<Snapshot>>,
{
  match fetch().await {
    Ok(snapshot) => Served::from_network(snapshot),
    Err(e) => {
      debug!("Auth fetch failed for {}: {}", key.description(), e);
      Served::synthesized(Snapshot::redirect_to("/"))
    }
  }
}

/// Cache read treated as a soft failure: a broken store must not take down
/// request handling.
fn lookup<S: CacheStore + ?Sized>(store: &S, partition: &str, key: &RequestKey) -> Option<Snapshot> {
  match store.get(partition, key) {
    Ok(Some(cached)) => {
      debug!(
        "Cache hit for {} (stored {})",
        key.description(),
        cached.cached_at
      );
      Some(cached.snapshot)
    }
    Ok(None) => None,
    Err(e) => {
      warn!("Cache read failed for {}: {}", key.description(), e);
      None
    }
  }
}

fn store_snapshot<S: CacheStore + ?Sized>(
  store: &S,
  partition: &str,
  key: &RequestKey,
  snapshot: &Snapshot,
) {
  if let Err(e) = store.put(partition, key, snapshot) {
    warn!("Cache write failed for {}: {}", key.description(), e);
  }
}

fn refresh_in_background<S, F, Fut>(store: Arc<S>, partition: String, key: RequestKey, fetch: F)
where
  S: CacheStore + 'static,
  F: FnOnce() -> Fut + Send + 'static,
  Fut: Future<Output = Result<Snapshot>> + Send + 'static,
{
  tokio::spawn(async move {
    match fetch().await {
      Ok(snapshot) if snapshot.is_success() => {
        store_snapshot(store.as_ref(), &partition, &key, &snapshot);
      }
      Ok(snapshot) => {
        debug!(
          "Skipping refresh of {} with status {}",
          key.description(),
          snapshot.status
        );
      }
      Err(e) => {
        debug!("Background refresh failed for {}: {}", key.description(), e);
      }
    }
  });
}

async fn fetch_with_timeout<F, Fut>(timeout: Duration, fetch: F, key: &RequestKey) -> Option<Snapshot>
where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<Snapshot>>,
{
  match tokio::time::timeout(timeout, fetch()).await {
    Ok(Ok(snapshot)) => Some(snapshot),
    Ok(Err(e)) => {
      debug!("Fetch failed for {}: {}", key.description(), e);
      None
    }
    Err(_) => {
      debug!("Fetch timed out for {}", key.description());
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::traits::ServedFrom;
  use crate::cache::SqliteStore;
  use color_eyre::eyre::eyre;

  const PARTITION: &str = "triptracker-v3-api";
  const STATIC_PARTITION: &str = "triptracker-v3-static";

  fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
  }

  fn key() -> RequestKey {
    RequestKey::get("https://tracker.example.com/api/events/")
  }

  fn ok_snapshot(body: &[u8]) -> Snapshot {
    Snapshot::new(
      200,
      vec![("content-type".to_string(), "application/json".to_string())],
      body.to_vec(),
    )
  }

  /// Let spawned refresh tasks run on the current-thread test runtime.
  async fn settle() {
    for _ in 0..10 {
      tokio::task::yield_now().await;
    }
  }

  #[tokio::test]
  async fn cache_first_serves_hit_and_refreshes() {
    let store = store();
    let k = key();
    store.put(PARTITION, &k, &ok_snapshot(b"old")).unwrap();

    let served = cache_first(store.clone(), PARTITION.to_string(), k.clone(), || async {
      Ok(ok_snapshot(b"new"))
    })
    .await;

    assert_eq!(served.source, ServedFrom::Cache);
    assert_eq!(served.snapshot.body, b"old");

    settle().await;
    let refreshed = store.get(PARTITION, &k).unwrap().unwrap();
    assert_eq!(refreshed.snapshot.body, b"new");
  }

  #[tokio::test]
  async fn cache_first_miss_fetches_and_stores() {
    let store = store();
    let k = key();

    let served = cache_first(store.clone(), PARTITION.to_string(), k.clone(), || async {
      Ok(ok_snapshot(b"fresh"))
    })
    .await;

    assert_eq!(served.source, ServedFrom::Network);
    assert!(store.get(PARTITION, &k).unwrap().is_some());
  }

  #[tokio::test]
  async fn cache_first_miss_and_fetch_failure_synthesizes_503() {
    let served = cache_first(store(), PARTITION.to_string(), key(), || async {
      Err(eyre!("connection refused"))
    })
    .await;

    assert_eq!(served.source, ServedFrom::Synthesized);
    assert_eq!(served.snapshot.status, 503);
  }

  #[tokio::test]
  async fn network_first_api_prefers_network() {
    let store = store();
    let k = key();
    store.put(PARTITION, &k, &ok_snapshot(b"stale")).unwrap();

    let served = network_first_api(
      store.clone(),
      PARTITION.to_string(),
      k.clone(),
      Duration::from_secs(10),
      || async { Ok(ok_snapshot(b"live")) },
    )
    .await;

    assert_eq!(served.source, ServedFrom::Network);
    assert_eq!(served.snapshot.body, b"live");
    assert_eq!(store.get(PARTITION, &k).unwrap().unwrap().snapshot.body, b"live");
  }

  #[tokio::test]
  async fn network_first_api_falls_back_to_cache() {
    let store = store();
    let k = key();
    store.put(PARTITION, &k, &ok_snapshot(b"stale")).unwrap();

    let served = network_first_api(
      store.clone(),
      PARTITION.to_string(),
      k.clone(),
      Duration::from_secs(10),
      || async { Err(eyre!("offline")) },
    )
    .await;

    assert_eq!(served.source, ServedFrom::Cache);
    assert_eq!(served.snapshot.body, b"stale");
  }

  #[tokio::test]
  async fn network_first_api_synthesizes_json_error_when_nothing_cached() {
    let served = network_first_api(
      store(),
      PARTITION.to_string(),
      key(),
      Duration::from_secs(10),
      || async { Err(eyre!("offline")) },
    )
    .await;

    assert_eq!(served.source, ServedFrom::Synthesized);
    assert_eq!(served.snapshot.status, 503);
    assert_eq!(served.snapshot.header("content-type"), Some("application/json"));
  }

  #[tokio::test(start_paused = true)]
  async fn network_first_api_times_out_slow_fetches() {
    let store = store();
    let k = key();
    store.put(PARTITION, &k, &ok_snapshot(b"stale")).unwrap();

    let served = network_first_api(
      store.clone(),
      PARTITION.to_string(),
      k.clone(),
      Duration::from_secs(10),
      || std::future::pending(),
    )
    .await;

    assert_eq!(served.source, ServedFrom::Cache);
  }

  #[tokio::test]
  async fn network_first_page_does_not_store_redirects() {
    let store = store();
    let k = RequestKey::get("https://tracker.example.com/vehicles/1/");

    let served = network_first_page(
      store.clone(),
      "triptracker-v3-dynamic".to_string(),
      k.clone(),
      &RequestKey::get("https://tracker.example.com/offline/"),
      STATIC_PARTITION,
      Duration::from_secs(10),
      || async { Ok(Snapshot::redirect_to("/accounts/login/")) },
    )
    .await;

    assert_eq!(served.source, ServedFrom::Network);
    assert!(store.get("triptracker-v3-dynamic", &k).unwrap().is_none());
  }

  #[tokio::test]
  async fn network_first_page_falls_back_to_offline_page() {
    let store = store();
    let offline_key = RequestKey::get("https://tracker.example.com/offline/");
    store
      .put(STATIC_PARTITION, &offline_key, &ok_snapshot(b"<h1>Offline</h1>"))
      .unwrap();

    let served = network_first_page(
      store.clone(),
      "triptracker-v3-dynamic".to_string(),
      RequestKey::get("https://tracker.example.com/vehicles/1/"),
      &offline_key,
      STATIC_PARTITION,
      Duration::from_secs(10),
      || async { Err(eyre!("offline")) },
    )
    .await;

    assert_eq!(served.source, ServedFrom::OfflinePage);
    assert_eq!(served.snapshot.body, b"<h1>Offline</h1>");
  }

  #[tokio::test]
  async fn stale_while_revalidate_serves_cache_then_updates() {
    let store = store();
    let k = RequestKey::get("https://tracker.example.com/favicon.ico");
    store.put("triptracker-v3-dynamic", &k, &ok_snapshot(b"v1")).unwrap();

    let served = stale_while_revalidate(
      store.clone(),
      "triptracker-v3-dynamic".to_string(),
      k.clone(),
      || async { Ok(ok_snapshot(b"v2")) },
    )
    .await;

    assert_eq!(served.source, ServedFrom::Cache);
    assert_eq!(served.snapshot.body, b"v1");

    settle().await;
    let refreshed = store.get("triptracker-v3-dynamic", &k).unwrap().unwrap();
    assert_eq!(refreshed.snapshot.body, b"v2");
  }

  #[tokio::test]
  async fn stale_while_revalidate_total_failure_synthesizes_503() {
    let served = stale_while_revalidate(
      store(),
      "triptracker-v3-dynamic".to_string(),
      RequestKey::get("https://tracker.example.com/favicon.ico"),
      || async { Err(eyre!("offline")) },
    )
    .await;

    assert_eq!(served.source, ServedFrom::Synthesized);
    assert_eq!(served.snapshot.status, 503);
    assert_eq!(served.snapshot.body, b"Network error occurred");
  }

  #[tokio::test]
  async fn network_only_failure_redirects_to_root() {
    let k = RequestKey::get("https://tracker.example.com/accounts/login/");
    let served = network_only(&k, || async { Err(eyre!("offline")) }).await;

    assert_eq!(served.source, ServedFrom::Synthesized);
    assert_eq!(served.snapshot.status, 302);
    assert_eq!(served.snapshot.header("location"), Some("/"));
  }
}
