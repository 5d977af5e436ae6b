//! Wires configuration into the worker and the page bridge.

use color_eyre::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::analytics::EventLog;
use crate::bridge::{ClientBridge, Connectivity};
use crate::cache::{CacheManager, CacheStorage, SqliteStorage};
use crate::config::Config;
use crate::db::Database;
use crate::http;
use crate::lifecycle::{Clients, Lifecycle};
use crate::network::{self, HttpNetwork, Network, Switchable};
use crate::notify::{Permission, Toasts};
use crate::queue::QueueStore;
use crate::strategy::FetchEngine;
use crate::sync::SyncCoordinator;
use crate::worker::ServiceWorker;

/// Everything one process needs: the worker, one page, and shared stores.
pub struct Host {
  pub config: Config,
  pub origin: Url,
  pub worker: Arc<ServiceWorker>,
  pub bridge: Arc<ClientBridge>,
  pub cache: CacheManager,
  pub queue: QueueStore,
  pub events: EventLog,
  pub toasts: Arc<Toasts>,
  pub network: Arc<Switchable>,
}

impl Host {
  /// Open the stores under the data directory and probe the origin once.
  pub async fn open(config: Config, forced_offline: bool) -> Result<Self> {
    let data_dir = config.data_dir()?;
    let network = Arc::new(Switchable::new(Arc::new(HttpNetwork::new()?)));
    network.set_offline(forced_offline);

    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open(&data_dir.join("cache.db"))?);
    let db = Arc::new(Database::open(&config.queue()?.path)?);

    let origin = http::resolve(&config.origin, "/")?;
    let online = network::probe(network.as_ref(), &origin).await;
    info!(origin = %origin, online, "Host starting");

    Self::assemble(config, origin, storage, db, network, online)
  }

  fn assemble(
    config: Config,
    origin: Url,
    storage: Arc<dyn CacheStorage>,
    db: Arc<Database>,
    network: Arc<Switchable>,
    online: bool,
  ) -> Result<Self> {
    let shared: Arc<dyn Network> = network.clone();
    let cache_config = config.cache();
    let cache = CacheManager::new(Arc::clone(&storage), cache_config.clone());
    let queue = QueueStore::new(Arc::clone(&db));
    let events = EventLog::new(Arc::clone(&db));

    let sync = Arc::new(SyncCoordinator::new(
      queue.clone(),
      Arc::clone(&shared),
      http::resolve(&config.origin, &config.contact_endpoint)?,
      config.sync(),
    ));
    let engine = FetchEngine::new(
      cache.clone(),
      Arc::clone(&shared),
      Arc::clone(&sync),
      http::resolve(&config.origin, &cache_config.root_document)?,
    );

    let clients = Clients::default();
    let controller = storage.get_meta(crate::lifecycle::ACTIVE_VERSION)?;
    let page = clients.open(controller);
    let lifecycle = Lifecycle::new(
      config.version.clone(),
      config.origin.clone(),
      cache.clone(),
      Arc::clone(&shared),
      clients.clone(),
    );

    let toasts = Arc::new(Toasts::new(Permission::Granted));
    let worker = Arc::new(ServiceWorker::new(
      lifecycle,
      engine,
      Arc::clone(&sync),
      toasts.clone(),
    ));

    let connectivity = if online {
      Connectivity::Online
    } else {
      Connectivity::Offline
    };
    let bridge = Arc::new(ClientBridge::new(
      sync,
      toasts.clone(),
      db,
      clients,
      page,
      connectivity,
    ));

    Ok(Self {
      config,
      origin,
      worker,
      bridge,
      cache,
      queue,
      events,
      toasts,
      network,
    })
  }

  /// Record a usage event against a page path. Failures only get logged.
  pub fn track(&self, event: &str, path: &str, data: Value) {
    let url = self
      .origin
      .join(path)
      .map(String::from)
      .unwrap_or_else(|_| self.origin.to_string());
    if let Err(e) = self.events.track(event, &data, &url) {
      warn!(error = %e, event, "Failed to track event");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bridge::FormOutcome;
  use crate::http::{Request, Response};
  use crate::network::testing::FakeNetwork;
  use crate::worker::{WorkerEvent, WorkerOutcome};
  use serde_json::json;

  const ORIGIN: &str = "https://me.dev";

  fn host(fake: Arc<FakeNetwork>, online: bool) -> Host {
    let config = Config {
      origin: ORIGIN.to_string(),
      static_manifest: vec!["/index.html".into()],
      dynamic_manifest: vec![],
      ..Config::default()
    };
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let db = Arc::new(Database::open_in_memory().unwrap());
    let network = Arc::new(Switchable::new(fake));
    let origin = Url::parse(ORIGIN).unwrap();
    Host::assemble(config, origin, storage, db, network, online).unwrap()
  }

  #[tokio::test]
  async fn test_offline_submissions_drain_on_reconnect() {
    let fake = Arc::new(FakeNetwork::online());
    fake.route(&format!("{}/api/contact", ORIGIN), Response::ok("{}"));
    fake.fail_when_body_contains("still-failing");
    let host = host(fake.clone(), false);

    // One through the page bridge, one through the worker's POST path
    let outcome = host
      .bridge
      .submit_form(&[("message".to_string(), "still-failing".to_string())])
      .unwrap();
    assert!(matches!(outcome, FormOutcome::Queued(_)));

    host.network.set_offline(true);
    let request = Request::post_json(
      http::resolve(ORIGIN, "/api/contact").unwrap(),
      &json!({"message": "hola"}),
    )
    .unwrap();
    let WorkerOutcome::Response(served) = host.worker.dispatch(WorkerEvent::Fetch(request)).await.unwrap() else {
      panic!("expected a response");
    };
    assert_eq!(served.response.status, 202);
    assert_eq!(host.queue.count_undelivered().unwrap(), 2);

    host.network.set_offline(false);
    let report = host
      .bridge
      .set_connectivity(Connectivity::Online)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered, 1);

    let records = host.queue.list_all().unwrap();
    assert!(!records[0].delivered);
    assert!(records[1].delivered);
  }

  #[tokio::test]
  async fn test_track_resolves_page_url() {
    let host = host(Arc::new(FakeNetwork::online()), true);
    host.track("page_view", "/about", json!({"referrer": ""}));

    let events = host.events.events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "page_view");
    assert_eq!(events[0].url, "https://me.dev/about");
  }

  #[tokio::test]
  async fn test_page_starts_uncontrolled_then_claimed() {
    let fake = Arc::new(FakeNetwork::online());
    fake.route(&format!("{}/index.html", ORIGIN), Response::ok("<html></html>"));
    let host = host(fake, true);
    assert!(host.worker.lifecycle().active_version().unwrap().is_none());

    let report = host.worker.start().await.unwrap().unwrap();
    assert_eq!(report.claimed, 1);
    assert!(host.worker.lifecycle().active_version().unwrap().is_some());
    let generations = host.cache.generations().unwrap();
    assert_eq!(generations.len(), 2);
    assert!(generations.iter().all(|g| g.current));
  }
}
