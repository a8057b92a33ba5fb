//! Application wiring: stores, worker, monitor and sync loop.

use std::sync::Arc;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};
use url::Url;

use crate::cache::{Served, SqliteStore};
use crate::config::Config;
use crate::net::{HttpClient, NetworkMonitor};
use crate::queue::{MutationKind, OfflineQueue};
use crate::sync::{SyncCoordinator, SyncReport};
use crate::worker::{FetchRequest, FetchWorker};

pub struct App {
  config: Config,
  client: HttpClient,
  worker: FetchWorker<SqliteStore, HttpClient>,
  queue: Arc<OfflineQueue>,
  coordinator: SyncCoordinator<HttpClient>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let client = HttpClient::new(&config)?;

    let db_path = match &config.cache.db_path {
      Some(path) => path.clone(),
      None => SqliteStore::default_path()?,
    };
    if let Some(parent) = db_path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)
          .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
      }
    }

    // Cache and queue share one database file, each with its own connection
    let store = Arc::new(SqliteStore::open(&db_path)?);
    let queue = Arc::new(OfflineQueue::open(&db_path)?);

    let worker = FetchWorker::new(store, Arc::new(client.clone()), client.base(), &config)?;
    let coordinator = SyncCoordinator::new(queue.clone(), client.clone());

    Ok(Self {
      config,
      client,
      worker,
      queue,
      coordinator,
    })
  }

  /// Install, activate, then watch connectivity and sync on recovery. Runs
  /// until interrupted.
  pub async fn run(self) -> Result<()> {
    // Install is best-effort: a degraded precache is better than no start
    if let Err(e) = self.worker.install().await {
      warn!("Install failed, continuing with whatever is cached: {}", e);
    }
    self.worker.activate().await?;

    let client = self.client.clone();
    let probe = move || {
      let client = client.clone();
      async move { client.probe().await }
    };
    let interval = Duration::from_secs(self.config.network.probe_interval_secs);
    let (monitor, mut status_rx, _hint_tx) = NetworkMonitor::new(probe, interval);
    tokio::spawn(monitor.run());

    let mut was_online = status_rx.borrow().is_online();
    loop {
      status_rx
        .changed()
        .await
        .map_err(|e| eyre!("Network monitor stopped: {}", e))?;
      let online = status_rx.borrow().is_online();

      if online && !was_online {
        info!("Back online, replaying queued mutations");
        match self.coordinator.sync_all().await {
          Ok(report) if report.attempted > 0 => {
            info!("Replayed {}/{} queued mutations", report.synced, report.attempted);
          }
          Ok(_) => {}
          Err(e) => warn!("Sync failed: {}", e),
        }
      } else if !online && was_online {
        let pending = self.queue.len().unwrap_or(0);
        info!("Connection lost; {} mutations queued for later", pending);
      }

      was_online = online;
    }
  }

  /// One-shot replay of the whole queue.
  pub async fn sync_once(&self) -> Result<SyncReport> {
    self.coordinator.sync_all().await
  }

  /// Record a todo toggle for replay once connectivity returns. Durable
  /// before this returns.
  pub fn queue_toggle_todo(&self, todo_id: i64) -> Result<i64> {
    self
      .queue
      .enqueue(MutationKind::ToggleTodo, &serde_json::json!({ "todoId": todo_id }))
  }

  /// Record an event creation for replay once connectivity returns.
  pub fn queue_create_event(&self, payload: &str) -> Result<i64> {
    let payload: serde_json::Value =
      serde_json::from_str(payload).map_err(|e| eyre!("Invalid event payload: {}", e))?;
    self.queue.enqueue(MutationKind::CreateEvent, &payload)
  }

  /// Fetch a single URL through the worker, using its caching strategies.
  pub async fn fetch(&self, target: &str, navigation: bool) -> Result<Served> {
    let url = if target.starts_with('/') {
      self.client.base().join(target)?
    } else {
      Url::parse(target).map_err(|e| eyre!("Invalid URL {}: {}", target, e))?
    };

    let request = if navigation {
      FetchRequest::navigation(url)
    } else {
      FetchRequest::get(url)
    };

    self.worker.handle(&request).await
  }

  /// Current connectivity and queue depth.
  pub async fn status(&self) -> Result<(bool, usize)> {
    let online = self.client.probe().await;
    let pending = self.queue.len()?;
    Ok((online, pending))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn app() -> App {
    let config: Config = serde_yaml::from_str(
      "server:\n  url: https://tracker.example.com\ncache:\n  db_path: ':memory:'\n",
    )
    .unwrap();
    App::new(config).unwrap()
  }

  #[test]
  fn queued_toggle_is_durable_and_uses_the_todo_id_shape() {
    let app = app();
    app.queue_toggle_todo(42).unwrap();

    let pending = app.queue.list(MutationKind::ToggleTodo).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload, json!({"todoId": 42}));
  }

  #[test]
  fn queued_event_must_be_valid_json() {
    let app = app();
    assert!(app.queue_create_event("not json").is_err());

    app
      .queue_create_event(r#"{"vehicle": 1, "event_type": "refuel"}"#)
      .unwrap();
    assert_eq!(app.queue.len().unwrap(), 1);
  }
}
