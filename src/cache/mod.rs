//! Versioned response cache: partitions, snapshots, storage.

pub mod storage;
pub mod traits;

pub use storage::{CacheStore, SqliteStore};
pub use traits::{RequestKey, Served, Snapshot};

/// Roles a cache partition can play. Exactly one partition per role is
/// current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionRole {
  /// Pre-cached app shell assets
  Static,
  /// Navigations, dynamic routes and uncategorized responses
  Dynamic,
  /// API responses
  Api,
}

impl PartitionRole {
  pub fn suffix(self) -> &'static str {
    match self {
      Self::Static => "static",
      Self::Dynamic => "dynamic",
      Self::Api => "api",
    }
  }
}

/// The current cache version. Partition names embed the version tag, so
/// bumping the tag supersedes every existing partition: anything whose name
/// is not in [`CacheVersion::retained`] is deleted on activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheVersion {
  tag: String,
}

impl CacheVersion {
  pub fn new(tag: impl Into<String>) -> Self {
    Self { tag: tag.into() }
  }

  /// Name of the current partition for a role, e.g. "triptracker-v3-static".
  pub fn partition(&self, role: PartitionRole) -> String {
    format!("{}-{}", self.tag, role.suffix())
  }

  /// The full set of partition names this version keeps alive.
  pub fn retained(&self) -> Vec<String> {
    [PartitionRole::Static, PartitionRole::Dynamic, PartitionRole::Api]
      .into_iter()
      .map(|role| self.partition(role))
      .collect()
  }

  pub fn retains(&self, partition: &str) -> bool {
    self.retained().iter().any(|name| name == partition)
  }
}
