/// Ordered schema migrations. Entry `n` upgrades a database from version `n`
/// to `n + 1`; every statement only creates what is missing.
pub const MIGRATIONS: &[&str] = &[
  // v1: deferred outbound requests
  r#"
CREATE TABLE IF NOT EXISTS offline_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_offline_requests_timestamp ON offline_requests(timestamp);
CREATE INDEX IF NOT EXISTS idx_offline_requests_synced ON offline_requests(synced);
"#,
  // v2: page-level preferences
  r#"
CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#,
  // v3: local usage log
  r#"
CREATE TABLE IF NOT EXISTS analytics_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event TEXT NOT NULL,
    data TEXT NOT NULL,
    url TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);
"#,
];

/// Version a fully migrated database reports.
pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;
