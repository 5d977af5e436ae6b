pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Durable local database shared by the offline queue and the page preferences.
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database at `path`, upgrading its schema if needed.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;
    Ok(db)
  }

  /// Run every migration newer than the stored `user_version`.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.conn()?;
    let current = Self::version_of(&conn)?;

    if current > schema::SCHEMA_VERSION {
      return Err(eyre!(
        "Database schema version {} is newer than supported version {}",
        current,
        schema::SCHEMA_VERSION
      ));
    }

    for (index, migration) in schema::MIGRATIONS.iter().enumerate().skip(current as usize) {
      let version = index as i64 + 1;
      conn
        .execute_batch(migration)
        .map_err(|e| eyre!("Failed to run migration to v{}: {}", version, e))?;
      conn
        .pragma_update(None, "user_version", version)
        .map_err(|e| eyre!("Failed to record schema version {}: {}", version, e))?;
      info!(version, "Upgraded local database");
    }

    Ok(())
  }

  fn version_of(conn: &Connection) -> Result<i64> {
    conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to read schema version: {}", e))
  }

  /// Lock and borrow the connection
  pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  #[cfg(test)]
  pub fn schema_version(&self) -> Result<i64> {
    let conn = self.conn()?;
    Self::version_of(&conn)
  }

  pub fn preference(&self, key: &str) -> Result<Option<String>> {
    self
      .conn()?
      .query_row(
        "SELECT value FROM preferences WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read preference {}: {}", key, e))
  }

  pub fn set_preference(&self, key: &str, value: &str) -> Result<()> {
    self
      .conn()?
      .execute(
        "INSERT OR REPLACE INTO preferences (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write preference {}: {}", key, e))?;
    Ok(())
  }
}
