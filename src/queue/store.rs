use chrono::{DateTime, TimeZone, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::db::Database;

/// One deferred outbound request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedRequest {
  /// Auto-incremented, never reused
  pub id: i64,
  /// Opaque payload, replayed as the request body
  pub payload: Value,
  pub created_at: DateTime<Utc>,
  pub delivered: bool,
}

impl QueuedRequest {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, i64, bool)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
  }

  fn decode((id, data, timestamp, synced): (i64, String, i64, bool)) -> Result<Self> {
    let payload = serde_json::from_str(&data)
      .map_err(|e| eyre!("Failed to decode queued request {}: {}", id, e))?;
    let created_at = Utc
      .timestamp_millis_opt(timestamp)
      .single()
      .ok_or_else(|| eyre!("Invalid timestamp {} on queued request {}", timestamp, id))?;

    Ok(Self {
      id,
      payload,
      created_at,
      delivered: synced,
    })
  }
}

/// Queue store backed by the local database.
#[derive(Clone)]
pub struct QueueStore {
  db: Arc<Database>,
}

impl QueueStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Insert a new undelivered record. Returns once the write has committed.
  pub fn enqueue(&self, payload: &Value) -> Result<i64> {
    let data =
      serde_json::to_string(payload).map_err(|e| eyre!("Failed to encode payload: {}", e))?;
    let conn = self.db.conn()?;

    conn
      .execute(
        "INSERT INTO offline_requests (data, timestamp, synced) VALUES (?, ?, 0)",
        params![data, Utc::now().timestamp_millis()],
      )
      .map_err(|e| eyre!("Failed to store offline request: {}", e))?;

    let id = conn.last_insert_rowid();
    debug!(id, "Queued offline request");
    Ok(id)
  }

  /// Undelivered records, oldest first.
  pub fn list_undelivered(&self) -> Result<Vec<QueuedRequest>> {
    self.query(
      "SELECT id, data, timestamp, synced FROM offline_requests
       WHERE synced = 0 ORDER BY id",
    )
  }

  /// Every record, delivered or not, oldest first.
  pub fn list_all(&self) -> Result<Vec<QueuedRequest>> {
    self.query("SELECT id, data, timestamp, synced FROM offline_requests ORDER BY id")
  }

  fn query(&self, sql: &str) -> Result<Vec<QueuedRequest>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare(sql)
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], QueuedRequest::from_row)
      .map_err(|e| eyre!("Failed to query offline requests: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read offline request: {}", e))?;

    rows.into_iter().map(QueuedRequest::decode).collect()
  }

  pub fn get(&self, id: i64) -> Result<Option<QueuedRequest>> {
    let row = self
      .db
      .conn()?
      .query_row(
        "SELECT id, data, timestamp, synced FROM offline_requests WHERE id = ?",
        params![id],
        QueuedRequest::from_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to read offline request {}: {}", id, e))?;

    row.map(QueuedRequest::decode).transpose()
  }

  /// Flag one record as delivered. Idempotent; returns false if no such record.
  pub fn mark_delivered(&self, id: i64) -> Result<bool> {
    let updated = self
      .db
      .conn()?
      .execute(
        "UPDATE offline_requests SET synced = 1 WHERE id = ?",
        params![id],
      )
      .map_err(|e| eyre!("Failed to mark request {} delivered: {}", id, e))?;
    Ok(updated > 0)
  }

  pub fn count_undelivered(&self) -> Result<usize> {
    let count: i64 = self
      .db
      .conn()?
      .query_row(
        "SELECT COUNT(*) FROM offline_requests WHERE synced = 0",
        [],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count offline requests: {}", e))?;
    Ok(count as usize)
  }

  /// Remove delivered records. Returns how many were removed.
  pub fn purge_delivered(&self) -> Result<usize> {
    self
      .db
      .conn()?
      .execute("DELETE FROM offline_requests WHERE synced = 1", [])
      .map_err(|e| eyre!("Failed to purge delivered requests: {}", e))
  }
}
