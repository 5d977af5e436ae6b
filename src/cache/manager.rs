//! Named cache buckets on top of a storage backend.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::key::CacheKey;
use super::storage::CacheStorage;
use super::types::{Bucket, CachedEntry, GenerationInfo};
use crate::config::CacheConfig;
use crate::http::Response;

/// Handle to one opened bucket.
#[derive(Clone)]
pub struct CacheHandle {
  name: String,
  storage: Arc<dyn CacheStorage>,
}

impl CacheHandle {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn put(&self, key: &CacheKey, response: &Response) -> Result<()> {
    self.storage.put(&self.name, key, response)
  }
}

/// Owns the static and dynamic generations for the configured version.
#[derive(Clone)]
pub struct CacheManager {
  storage: Arc<dyn CacheStorage>,
  config: CacheConfig,
}

impl CacheManager {
  pub fn new(storage: Arc<dyn CacheStorage>, config: CacheConfig) -> Self {
    Self { storage, config }
  }

  pub fn config(&self) -> &CacheConfig {
    &self.config
  }

  pub fn storage(&self) -> &Arc<dyn CacheStorage> {
    &self.storage
  }

  fn name_of(&self, bucket: Bucket) -> &str {
    match bucket {
      Bucket::Static => &self.config.static_name,
      Bucket::Dynamic => &self.config.dynamic_name,
    }
  }

  /// Return the handle for a bucket, creating it if absent. Idempotent.
  pub fn open(&self, bucket: Bucket) -> Result<CacheHandle> {
    let name = self.name_of(bucket).to_string();
    self.storage.create_bucket(&name)?;
    Ok(CacheHandle {
      name,
      storage: Arc::clone(&self.storage),
    })
  }

  /// Look a key up in the live generations, static first.
  pub fn match_key(&self, key: &CacheKey) -> Result<Option<CachedEntry>> {
    for name in self.config.current_names() {
      if let Some(entry) = self.storage.get(name, key)? {
        return Ok(Some(entry));
      }
    }
    Ok(None)
  }

  pub fn put(&self, bucket: Bucket, key: &CacheKey, response: &Response) -> Result<()> {
    self.storage.put(self.name_of(bucket), key, response)
  }

  /// Opportunistic write: only successful responses are stored and a
  /// storage failure is logged, never returned.
  pub fn put_best_effort(&self, bucket: Bucket, key: &CacheKey, response: &Response) {
    if !response.is_success() {
      debug!(url = key.url(), status = response.status, "Not caching unsuccessful response");
      return;
    }
    if let Err(e) = self.put(bucket, key, response) {
      warn!(url = key.url(), error = %e, "Cache write failed");
    }
  }

  /// Delete every bucket whose name is not in `current`. Returns the names removed.
  pub fn evict_obsolete(&self, current: &[&str]) -> Result<Vec<String>> {
    let mut deleted = Vec::new();
    for name in self.storage.bucket_names()? {
      if current.contains(&name.as_str()) {
        continue;
      }
      info!(cache = %name, "Deleting old cache");
      self.storage.delete_bucket(&name)?;
      deleted.push(name);
    }
    Ok(deleted)
  }

  /// Every stored generation, live or not, with its entry count.
  pub fn generations(&self) -> Result<Vec<GenerationInfo>> {
    let current = self.config.current_names();
    self
      .storage
      .bucket_names()?
      .into_iter()
      .map(|name| {
        Ok(GenerationInfo {
          entries: self.storage.entry_count(&name)?,
          current: current.contains(&name.as_str()),
          name,
        })
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::config::Config;
  use crate::http::Method;
  use url::Url;

  fn manager(version: &str, storage: Arc<dyn CacheStorage>) -> CacheManager {
    let config = Config {
      version: version.to_string(),
      ..Config::default()
    };
    CacheManager::new(storage, config.cache())
  }

  fn key(s: &str) -> CacheKey {
    CacheKey::new(Method::Get, &Url::parse(s).unwrap())
  }

  #[test]
  fn test_open_is_idempotent() {
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let cache = manager("1", storage.clone());

    let a = cache.open(Bucket::Static).unwrap();
    let b = cache.open(Bucket::Static).unwrap();
    assert_eq!(a.name(), b.name());
    assert_eq!(storage.bucket_names().unwrap().len(), 1);
  }

  #[test]
  fn test_match_prefers_static() {
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let cache = manager("1", storage);
    let k = key("https://me.dev/");

    cache.put(Bucket::Dynamic, &k, &Response::ok("dynamic")).unwrap();
    assert_eq!(cache.match_key(&k).unwrap().unwrap().response.body, b"dynamic");

    cache.put(Bucket::Static, &k, &Response::ok("static")).unwrap();
    assert_eq!(cache.match_key(&k).unwrap().unwrap().response.body, b"static");
  }

  #[test]
  fn test_match_ignores_obsolete_generations() {
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let old = manager("1", storage.clone());
    let new = manager("2", storage);
    let k = key("https://me.dev/");

    old.put(Bucket::Static, &k, &Response::ok("v1")).unwrap();
    assert!(new.match_key(&k).unwrap().is_none());
  }

  #[test]
  fn test_best_effort_skips_errors() {
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let cache = manager("1", storage);
    let k = key("https://me.dev/missing.png");

    cache.put_best_effort(Bucket::Dynamic, &k, &Response::new(404, "nope"));
    assert!(cache.match_key(&k).unwrap().is_none());
  }

  #[test]
  fn test_evict_obsolete_keeps_current() {
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let old = manager("1", storage.clone());
    let new = manager("2", storage.clone());
    let k = key("https://me.dev/");

    old.put(Bucket::Static, &k, &Response::ok("v1")).unwrap();
    old.put(Bucket::Dynamic, &k, &Response::ok("v1")).unwrap();
    new.put(Bucket::Static, &k, &Response::ok("v2")).unwrap();
    new.open(Bucket::Dynamic).unwrap();
    storage.create_bucket("portfolio-pwa-v1.0.0").unwrap();

    let deleted = new.evict_obsolete(&new.config().current_names()).unwrap();
    assert_eq!(deleted.len(), 3);

    let names = storage.bucket_names().unwrap();
    assert_eq!(
      names,
      vec![
        "portfolio-static-v2".to_string(),
        "portfolio-dynamic-v2".to_string()
      ]
    );
    assert_eq!(new.match_key(&k).unwrap().unwrap().response.body, b"v2");
  }
}
