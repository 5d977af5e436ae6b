//! Install and activate transitions for one worker version.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::info;

use crate::cache::{Bucket, CacheKey, CacheManager};
use crate::http::{self, Request};
use crate::network::Network;

/// Worker metadata key holding the version that controls pages.
pub const ACTIVE_VERSION: &str = "active_version";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Not installed yet
  Parsed,
  Installing,
  /// Installed and waiting for the previous version to let go
  Installed,
  Activating,
  Activated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

/// Open pages and the worker version controlling each.
#[derive(Clone, Default)]
pub struct Clients {
  inner: Arc<Mutex<ClientsInner>>,
}

#[derive(Default)]
struct ClientsInner {
  next_id: u64,
  pages: Vec<(ClientId, Option<String>)>,
}

impl Clients {
  /// Register a page; it is controlled by `controller` if one is active.
  pub fn open(&self, controller: Option<String>) -> ClientId {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.next_id += 1;
    let id = ClientId(inner.next_id);
    inner.pages.push((id, controller));
    id
  }

  pub fn controller(&self, id: ClientId) -> Option<String> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner
      .pages
      .iter()
      .find(|(page, _)| *page == id)
      .and_then(|(_, controller)| controller.clone())
  }

  /// Hand every open page to `version`. Returns how many pages changed hands.
  pub fn claim(&self, version: &str) -> usize {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let mut claimed = 0;
    for (_, controller) in inner.pages.iter_mut() {
      if controller.as_deref() != Some(version) {
        *controller = Some(version.to_string());
        claimed += 1;
      }
    }
    claimed
  }

  /// Re-bind one page to `version`, as a reload does.
  pub fn reload(&self, id: ClientId, version: Option<String>) {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    if let Some((_, controller)) = inner.pages.iter_mut().find(|(page, _)| *page == id) {
      *controller = version;
    }
  }
}

/// Lifecycle of one worker version.
pub struct Lifecycle {
  version: String,
  origin: String,
  cache: CacheManager,
  network: Arc<dyn Network>,
  clients: Clients,
  state: watch::Sender<WorkerState>,
  skip_waiting: Mutex<bool>,
}

impl Lifecycle {
  pub fn new(
    version: String,
    origin: String,
    cache: CacheManager,
    network: Arc<dyn Network>,
    clients: Clients,
  ) -> Self {
    let (state, _) = watch::channel(WorkerState::Parsed);
    Self {
      version,
      origin,
      cache,
      network,
      clients,
      state,
      skip_waiting: Mutex::new(false),
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn state(&self) -> WorkerState {
    *self.state.borrow()
  }

  /// Observe state transitions.
  pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
    self.state.subscribe()
  }

  /// Version currently controlling pages, from a previous activation.
  pub fn active_version(&self) -> Result<Option<String>> {
    self.cache.storage().get_meta(ACTIVE_VERSION)
  }

  pub fn skips_waiting(&self) -> bool {
    *self.skip_waiting.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Pre-warm both buckets in parallel.
  ///
  /// Any failed entry fails the install and the worker stays `Installing`;
  /// entries written before the failure are left for the retry to overwrite.
  pub async fn install(&self) -> Result<()> {
    info!(version = %self.version, "Installing");
    self.state.send_replace(WorkerState::Installing);

    let config = self.cache.config();
    tokio::try_join!(
      self.preload(Bucket::Static, &config.static_manifest),
      self.preload(Bucket::Dynamic, &config.dynamic_manifest),
    )?;

    *self.skip_waiting.lock().unwrap_or_else(|e| e.into_inner()) = true;
    self.state.send_replace(WorkerState::Installed);
    info!(version = %self.version, "Installation complete");
    Ok(())
  }

  async fn preload(&self, bucket: Bucket, manifest: &[String]) -> Result<usize> {
    let handle = self.cache.open(bucket)?;
    info!(cache = handle.name(), entries = manifest.len(), "Caching manifest");

    let fetches = manifest.iter().map(|entry| {
      let handle = handle.clone();
      async move {
        let url = http::resolve(&self.origin, entry)?;
        let request = Request::get(url);
        let response = self.network.fetch(&request).await?;
        if !response.is_success() {
          return Err(eyre!("Preload of {} answered {}", entry, response.status));
        }
        handle.put(&CacheKey::for_request(&request), &response)
      }
    });

    Ok(try_join_all(fetches).await?.len())
  }

  /// Drop obsolete generations and take over every open page.
  pub async fn activate(&self) -> Result<ActivationReport> {
    info!(version = %self.version, "Activating");
    self.state.send_replace(WorkerState::Activating);

    let current = self.cache.config().current_names();
    let deleted = self.cache.evict_obsolete(&current)?;
    self
      .cache
      .storage()
      .set_meta(ACTIVE_VERSION, &self.version)?;
    let claimed = self.clients.claim(&self.version);

    self.state.send_replace(WorkerState::Activated);
    info!(version = %self.version, deleted = deleted.len(), claimed, "Activation complete");
    Ok(ActivationReport { deleted, claimed })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
  /// Generation names removed
  pub deleted: Vec<String>,
  /// Pages newly controlled
  pub claimed: usize,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheStorage, SqliteStorage};
  use crate::config::Config;
  use crate::http::Response;
  use crate::network::testing::FakeNetwork;

  const ORIGIN: &str = "https://me.dev";

  fn config(version: &str) -> Config {
    Config {
      version: version.to_string(),
      origin: ORIGIN.to_string(),
      static_manifest: vec!["/".into(), "/index.html".into(), "/styles/main.css".into()],
      dynamic_manifest: vec!["https://images.example.com/a.jpeg".into()],
      ..Config::default()
    }
  }

  fn route_all(network: &FakeNetwork, config: &Config, tag: &str) {
    for entry in config.static_manifest.iter().chain(&config.dynamic_manifest) {
      let url = http::resolve(ORIGIN, entry).unwrap();
      network.route(url.as_str(), Response::ok(format!("{} {}", tag, entry)));
    }
  }

  fn lifecycle(
    config: &Config,
    storage: Arc<dyn CacheStorage>,
    network: Arc<FakeNetwork>,
    clients: Clients,
  ) -> Lifecycle {
    Lifecycle::new(
      config.version.clone(),
      config.origin.clone(),
      CacheManager::new(storage, config.cache()),
      network,
      clients,
    )
  }

  #[tokio::test]
  async fn test_install_preloads_both_buckets() {
    let config = config("1");
    let network = Arc::new(FakeNetwork::online());
    route_all(&network, &config, "v1");
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let worker = lifecycle(&config, storage.clone(), network, Clients::default());

    worker.install().await.unwrap();
    assert_eq!(worker.state(), WorkerState::Installed);
    assert!(worker.skips_waiting());
    assert_eq!(storage.entry_count("portfolio-static-v1").unwrap(), 3);
    assert_eq!(storage.entry_count("portfolio-dynamic-v1").unwrap(), 1);
  }

  #[tokio::test]
  async fn test_failed_preload_fails_install() {
    let config = config("1");
    let network = Arc::new(FakeNetwork::online());
    route_all(&network, &config, "v1");
    // One manifest entry answers 404
    network.route(&format!("{}/styles/main.css", ORIGIN), Response::new(404, ""));
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let worker = lifecycle(&config, storage, network, Clients::default());

    assert!(worker.install().await.is_err());
    assert_eq!(worker.state(), WorkerState::Installing);
    assert!(!worker.skips_waiting());
  }

  #[tokio::test]
  async fn test_offline_install_fails() {
    let config = config("1");
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let worker = lifecycle(&config, storage, Arc::new(FakeNetwork::offline()), Clients::default());
    assert!(worker.install().await.is_err());
  }

  #[tokio::test]
  async fn test_version_bump_replaces_generations() {
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let clients = Clients::default();
    let page = clients.open(None);

    let v1 = config("1");
    let network = Arc::new(FakeNetwork::online());
    route_all(&network, &v1, "v1");
    let first = lifecycle(&v1, storage.clone(), network.clone(), clients.clone());
    first.install().await.unwrap();
    let report = first.activate().await.unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(report.claimed, 1);
    assert_eq!(clients.controller(page).as_deref(), Some("1"));

    let v2 = config("2");
    route_all(&network, &v2, "v2");
    let second = lifecycle(&v2, storage.clone(), network, clients.clone());
    second.install().await.unwrap();
    let report = second.activate().await.unwrap();

    assert_eq!(
      report.deleted,
      vec!["portfolio-static-v1".to_string(), "portfolio-dynamic-v1".to_string()]
    );
    assert_eq!(second.state(), WorkerState::Activated);
    assert_eq!(second.active_version().unwrap().as_deref(), Some("2"));
    assert_eq!(clients.controller(page).as_deref(), Some("2"));

    let names = storage.bucket_names().unwrap();
    assert_eq!(names, vec!["portfolio-static-v2".to_string(), "portfolio-dynamic-v2".to_string()]);
    assert_eq!(storage.entry_count("portfolio-static-v2").unwrap(), v2.static_manifest.len());
  }

  #[tokio::test]
  async fn test_state_changes_are_observable() {
    let config = config("1");
    let network = Arc::new(FakeNetwork::online());
    route_all(&network, &config, "v1");
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let worker = lifecycle(&config, storage, network, Clients::default());
    let mut rx = worker.subscribe();

    worker.install().await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), WorkerState::Installed);
  }
}
