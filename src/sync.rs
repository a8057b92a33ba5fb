//! Replay of queued mutations once connectivity returns.

use std::sync::Arc;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};

use crate::cache::Snapshot;
use crate::net::HttpClient;
use crate::queue::{MutationKind, OfflineQueue, QueuedMutation};

/// Sync tag for queued todo toggles.
pub const SYNC_TODOS_TAG: &str = "sync-todos";
/// Sync tag for queued event creations.
pub const SYNC_EVENTS_TAG: &str = "sync-events";

pub fn kind_for_tag(tag: &str) -> Result<MutationKind> {
  match tag {
    SYNC_TODOS_TAG => Ok(MutationKind::ToggleTodo),
    SYNC_EVENTS_TAG => Ok(MutationKind::CreateEvent),
    other => Err(eyre!("Unknown sync tag: {}", other)),
  }
}

/// How mutations reach the server. Abstracted so replay logic can be tested
/// without a network.
#[async_trait]
pub trait MutationTransport: Send + Sync {
  async fn replay(&self, mutation: &QueuedMutation) -> Result<Snapshot>;
}

#[async_trait]
impl MutationTransport for HttpClient {
  async fn replay(&self, mutation: &QueuedMutation) -> Result<Snapshot> {
    match mutation.kind {
      MutationKind::ToggleTodo => self.toggle_todo(todo_id(mutation)?).await,
      MutationKind::CreateEvent => self.create_event(&mutation.payload).await,
    }
  }
}

/// Queued toggle payloads carry `{"todoId": n}`.
fn todo_id(mutation: &QueuedMutation) -> Result<i64> {
  mutation
    .payload
    .get("todoId")
    .and_then(|v| v.as_i64())
    .ok_or_else(|| eyre!("Queue entry {} has no todoId", mutation.id))
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub attempted: usize,
  pub synced: usize,
  pub failed: usize,
}

impl SyncReport {
  fn merge(self, other: Self) -> Self {
    Self {
      attempted: self.attempted + other.attempted,
      synced: self.synced + other.synced,
      failed: self.failed + other.failed,
    }
  }
}

/// Drains the offline queue by replaying entries against a transport.
pub struct SyncCoordinator<T> {
  queue: Arc<OfflineQueue>,
  transport: T,
}

impl<T: MutationTransport> SyncCoordinator<T> {
  pub fn new(queue: Arc<OfflineQueue>, transport: T) -> Self {
    Self { queue, transport }
  }

  /// Replay every pending mutation, todos first.
  pub async fn sync_all(&self) -> Result<SyncReport> {
    let todos = self.sync_tag(SYNC_TODOS_TAG).await?;
    let events = self.sync_tag(SYNC_EVENTS_TAG).await?;
    Ok(todos.merge(events))
  }

  /// Replay pending mutations for one sync tag, oldest first. Entries are
  /// independent: one failing stays queued without blocking the rest.
  pub async fn sync_tag(&self, tag: &str) -> Result<SyncReport> {
    let kind = kind_for_tag(tag)?;
    let pending = self.queue.list(kind)?;

    let mut report = SyncReport {
      attempted: pending.len(),
      ..Default::default()
    };

    for mutation in &pending {
      match self.transport.replay(mutation).await {
        Ok(snapshot) if snapshot.is_success() => {
          self.queue.remove(mutation.id)?;
          report.synced += 1;
        }
        Ok(snapshot) => {
          warn!(
            "Server rejected queue entry {} with status {}, keeping it",
            mutation.id, snapshot.status
          );
          report.failed += 1;
        }
        Err(e) => {
          warn!(
            "Replay of queue entry {} (queued {}) failed: {}",
            mutation.id, mutation.created_at, e
          );
          report.failed += 1;
        }
      }
    }

    if report.attempted > 0 {
      info!(
        "Sync {}: {}/{} replayed, {} still queued",
        tag, report.synced, report.attempted, report.failed
      );
    }

    Ok(report)
  }
}
