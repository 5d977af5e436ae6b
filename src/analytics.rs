//! Local usage log. Nothing leaves the device; only the newest events are kept.

use chrono::{DateTime, TimeZone, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::db::Database;

/// Events kept after every write
pub const MAX_EVENTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedEvent {
  pub event: String,
  pub data: Value,
  pub url: String,
  pub at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct EventLog {
  db: Arc<Database>,
}

impl EventLog {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Append an event and drop everything older than the newest [`MAX_EVENTS`].
  pub fn track(&self, event: &str, data: &Value, url: &str) -> Result<()> {
    let encoded =
      serde_json::to_string(data).map_err(|e| eyre!("Failed to encode event data: {}", e))?;
    let conn = self.db.conn()?;

    conn
      .execute(
        "INSERT INTO analytics_events (event, data, url, timestamp) VALUES (?, ?, ?, ?)",
        params![event, encoded, url, Utc::now().timestamp_millis()],
      )
      .map_err(|e| eyre!("Failed to record event {}: {}", event, e))?;
    conn
      .execute(
        "DELETE FROM analytics_events WHERE id NOT IN
         (SELECT id FROM analytics_events ORDER BY id DESC LIMIT ?)",
        params![MAX_EVENTS as i64],
      )
      .map_err(|e| eyre!("Failed to trim event log: {}", e))?;

    debug!(event, url, "Event tracked");
    Ok(())
  }

  /// Stored events, oldest first.
  pub fn events(&self) -> Result<Vec<TrackedEvent>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT event, data, url, timestamp FROM analytics_events ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;
    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, i64>(3)?,
        ))
      })
      .map_err(|e| eyre!("Failed to read event log: {}", e))?;

    let mut events = Vec::new();
    for row in rows {
      let (event, data, url, timestamp) = row.map_err(|e| eyre!("Failed to read event: {}", e))?;
      events.push(TrackedEvent {
        data: serde_json::from_str(&data)
          .map_err(|e| eyre!("Failed to decode event {}: {}", event, e))?,
        at: Utc
          .timestamp_millis_opt(timestamp)
          .single()
          .ok_or_else(|| eyre!("Invalid timestamp {} on event {}", timestamp, event))?,
        event,
        url,
      });
    }
    Ok(events)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn log() -> EventLog {
    EventLog::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  #[test]
  fn test_track_stores_event() {
    let log = log();
    log
      .track("page_view", &json!({"page": "/"}), "https://me.dev/")
      .unwrap();

    let events = log.events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "page_view");
    assert_eq!(events[0].data["page"], "/");
    assert_eq!(events[0].url, "https://me.dev/");
  }

  #[test]
  fn test_only_newest_events_kept() {
    let log = log();
    for i in 0..MAX_EVENTS + 5 {
      log
        .track("section_view", &json!({"n": i}), "https://me.dev/")
        .unwrap();
    }

    let events = log.events().unwrap();
    assert_eq!(events.len(), MAX_EVENTS);
    assert_eq!(events[0].data["n"], 5);
    assert_eq!(events[MAX_EVENTS - 1].data["n"], MAX_EVENTS + 4);
  }
}
