//! Core types for the cache buckets.

use chrono::{DateTime, Utc};

use crate::http::Response;

/// The two bucket roles. Each maps to one live generation name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
  /// Precached shell and static assets
  Static,
  /// Pages and images picked up at runtime
  Dynamic,
}

/// A stored (request key, response snapshot) pair.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  /// Normalized URL the entry was stored under
  pub url: String,
  pub response: Response,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Summary of one cache generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationInfo {
  pub name: String,
  pub entries: usize,
  /// Whether the name matches one of the configured live generations
  pub current: bool,
}
