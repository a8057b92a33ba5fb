//! Durable queue for mutations made while offline.
//!
//! Writes are persisted before the caller is told the action succeeded, so
//! a crash between action and sync loses nothing. Entries are replayed in
//! insertion order once connectivity returns.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};

/// The kinds of mutation the app can perform offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
  /// Toggle a todo's completion state
  ToggleTodo,
  /// Record a new vehicle event
  CreateEvent,
}

impl MutationKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::ToggleTodo => "toggle-todo",
      Self::CreateEvent => "create-event",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "toggle-todo" => Ok(Self::ToggleTodo),
      "create-event" => Ok(Self::CreateEvent),
      other => Err(eyre!("Unknown mutation kind: {}", other)),
    }
  }
}

/// A queued mutation, as read back from storage.
#[derive(Debug, Clone)]
pub struct QueuedMutation {
  /// Monotonically increasing id; replay order follows it
  pub id: i64,
  pub kind: MutationKind,
  pub payload: serde_json::Value,
  pub created_at: DateTime<Utc>,
}

/// SQLite-backed offline mutation queue.
pub struct OfflineQueue {
  conn: Mutex<Connection>,
}

impl OfflineQueue {
  pub fn open(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open queue database at {}: {}", path.display(), e))?;
    Self::from_connection(conn)
  }

  /// In-memory queue, used by tests.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory queue: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let queue = Self {
      conn: Mutex::new(conn),
    };
    queue.run_migrations()?;
    Ok(queue)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(QUEUE_SCHEMA)
      .map_err(|e| eyre!("Failed to run queue migrations: {}", e))?;

    Ok(())
  }

  /// Persist a mutation and return its id. The row is committed before this
  /// returns.
  pub fn enqueue(&self, kind: MutationKind, payload: &serde_json::Value) -> Result<i64> {
    let conn = self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT INTO offline_queue (kind, payload, created_at) VALUES (?, ?, datetime('now'))",
        params![kind.as_str(), payload.to_string()],
      )
      .map_err(|e| eyre!("Failed to enqueue mutation: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  /// All pending mutations of one kind, oldest first.
  pub fn list(&self, kind: MutationKind) -> Result<Vec<QueuedMutation>> {
    let conn = self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT id, kind, payload, created_at FROM offline_queue
         WHERE kind = ? ORDER BY id",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map(params![kind.as_str()], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, String>(3)?,
        ))
      })
      .map_err(|e| eyre!("Failed to list queue: {}", e))?;

    let mut mutations = Vec::new();
    for row in rows {
      let (id, kind_str, payload_str, created_at_str) =
        row.map_err(|e| eyre!("Failed to read queue row: {}", e))?;

      mutations.push(QueuedMutation {
        id,
        kind: MutationKind::parse(&kind_str)?,
        payload: serde_json::from_str(&payload_str)
          .map_err(|e| eyre!("Corrupt payload for queue entry {}: {}", id, e))?,
        created_at: parse_datetime(&created_at_str)?,
      });
    }

    Ok(mutations)
  }

  /// Remove an entry by id. Removing an id that is already gone is fine:
  /// replay and manual cleanup may race.
  pub fn remove(&self, id: i64) -> Result<()> {
    let conn = self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM offline_queue WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove queue entry {}: {}", id, e))?;

    Ok(())
  }

  /// Number of pending mutations across all kinds.
  pub fn len(&self) -> Result<usize> {
    let conn = self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM offline_queue", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count queue: {}", e))?;

    Ok(count as usize)
  }
}

/// Schema for the offline mutation queue.
const QUEUE_SCHEMA: &str = r#"
-- Pending mutations, replayed oldest-first when connectivity returns
CREATE TABLE IF NOT EXISTS offline_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_offline_queue_kind
    ON offline_queue(kind);
"#;

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
