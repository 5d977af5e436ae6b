//! Worker event dispatch.

use color_eyre::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::http::Request;
use crate::lifecycle::{ActivationReport, Lifecycle};
use crate::notify::{NotificationAction, NotificationId, NotificationOptions, Notifier};
use crate::strategy::{FetchEngine, Served};
use crate::sync::{DrainReport, SyncCoordinator};

pub const PUSH_TITLE: &str = "Mi Portafolio Digital";
pub const PUSH_DEFAULT_BODY: &str = "Nueva actualización disponible";

/// Events the platform delivers to the worker. Each runs independently.
#[derive(Debug)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(Request),
  Sync { tag: String },
  PeriodicSync { tag: String },
  Push { data: Option<String> },
  NotificationClick {
    id: NotificationId,
    action: Option<String>,
  },
}

#[derive(Debug)]
pub enum WorkerOutcome {
  Installed,
  Activated(ActivationReport),
  Response(Served),
  Synced(DrainReport),
  Notified(Option<NotificationId>),
  /// Open a window at this path
  OpenWindow(String),
  /// Nothing to do for this event
  Ignored,
}

pub struct ServiceWorker {
  lifecycle: Lifecycle,
  engine: FetchEngine,
  sync: Arc<SyncCoordinator>,
  notifier: Arc<dyn Notifier>,
}

impl ServiceWorker {
  pub fn new(
    lifecycle: Lifecycle,
    engine: FetchEngine,
    sync: Arc<SyncCoordinator>,
    notifier: Arc<dyn Notifier>,
  ) -> Self {
    Self {
      lifecycle,
      engine,
      sync,
      notifier,
    }
  }

  pub fn lifecycle(&self) -> &Lifecycle {
    &self.lifecycle
  }

  pub fn sync(&self) -> &Arc<SyncCoordinator> {
    &self.sync
  }

  pub async fn dispatch(&self, event: WorkerEvent) -> Result<WorkerOutcome> {
    match event {
      WorkerEvent::Install => {
        self.lifecycle.install().await?;
        Ok(WorkerOutcome::Installed)
      }
      WorkerEvent::Activate => Ok(WorkerOutcome::Activated(self.lifecycle.activate().await?)),
      WorkerEvent::Fetch(request) => Ok(WorkerOutcome::Response(self.engine.handle(request).await?)),
      WorkerEvent::Sync { tag } => self.sync_for(&tag, false).await,
      WorkerEvent::PeriodicSync { tag } => self.sync_for(&tag, true).await,
      WorkerEvent::Push { data } => Ok(WorkerOutcome::Notified(self.show_push(data))),
      WorkerEvent::NotificationClick { id, action } => {
        self.notifier.close(id);
        match action.as_deref() {
          Some("explore") => Ok(WorkerOutcome::OpenWindow("/".to_string())),
          _ => Ok(WorkerOutcome::Ignored),
        }
      }
    }
  }

  async fn sync_for(&self, tag: &str, periodic: bool) -> Result<WorkerOutcome> {
    match self.sync.trigger_for_tag(tag, periodic) {
      Some(trigger) => Ok(WorkerOutcome::Synced(self.sync.drain(trigger).await?)),
      None => {
        debug!(tag, "Ignoring sync for unknown tag");
        Ok(WorkerOutcome::Ignored)
      }
    }
  }

  fn show_push(&self, data: Option<String>) -> Option<NotificationId> {
    let body = data.unwrap_or_else(|| PUSH_DEFAULT_BODY.to_string());

    let options = NotificationOptions {
      actions: vec![
        NotificationAction {
          action: "explore".to_string(),
          title: "Ver".to_string(),
        },
        NotificationAction {
          action: "close".to_string(),
          title: "Cerrar".to_string(),
        },
      ],
      data: Some(json!({
        "dateOfArrival": chrono::Utc::now().timestamp_millis(),
        "primaryKey": 1,
      })),
      ..NotificationOptions::default()
    };

    self.notifier.show(PUSH_TITLE, &body, options)
  }

  /// Install, then activate straight away when the install asked to skip waiting.
  pub async fn start(&self) -> Result<Option<ActivationReport>> {
    self.dispatch(WorkerEvent::Install).await?;
    if !self.lifecycle.skips_waiting() {
      info!("Waiting for the previous version to release its pages");
      return Ok(None);
    }
    match self.dispatch(WorkerEvent::Activate).await? {
      WorkerOutcome::Activated(report) => Ok(Some(report)),
      _ => Ok(None),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheManager, CacheStorage, SqliteStorage};
  use crate::config::Config;
  use crate::db::Database;
  use crate::http::{self, Response};
  use crate::lifecycle::{Clients, WorkerState};
  use crate::network::testing::FakeNetwork;
  use crate::notify::{Permission, Toasts};
  use crate::queue::QueueStore;
  use crate::strategy::ResponseSource;
  use std::time::Instant;

  const ORIGIN: &str = "https://me.dev";

  struct Harness {
    worker: ServiceWorker,
    network: Arc<FakeNetwork>,
    toasts: Arc<Toasts>,
  }

  fn harness() -> Harness {
    let config = Config {
      origin: ORIGIN.to_string(),
      static_manifest: vec!["/index.html".into()],
      dynamic_manifest: vec![],
      ..Config::default()
    };
    let network = Arc::new(FakeNetwork::online());
    network.route(&format!("{}/index.html", ORIGIN), Response::ok("<html>shell</html>"));
    network.route(&format!("{}/api/contact", ORIGIN), Response::ok("{}"));

    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let cache = CacheManager::new(storage, config.cache());
    let sync = Arc::new(SyncCoordinator::new(
      QueueStore::new(Arc::new(Database::open_in_memory().unwrap())),
      network.clone(),
      http::resolve(ORIGIN, &config.contact_endpoint).unwrap(),
      config.sync(),
    ));
    let engine = FetchEngine::new(
      cache.clone(),
      network.clone(),
      sync.clone(),
      http::resolve(ORIGIN, "/index.html").unwrap(),
    );
    let lifecycle = Lifecycle::new(
      config.version.clone(),
      config.origin.clone(),
      cache,
      network.clone(),
      Clients::default(),
    );
    let toasts = Arc::new(Toasts::new(Permission::Granted));
    toasts.request_permission();

    Harness {
      worker: ServiceWorker::new(lifecycle, engine, sync, toasts.clone()),
      network,
      toasts,
    }
  }

  #[tokio::test]
  async fn test_start_installs_and_activates() {
    let h = harness();
    let report = h.worker.start().await.unwrap();
    assert!(report.is_some());
    assert_eq!(h.worker.lifecycle().state(), WorkerState::Activated);
  }

  #[tokio::test]
  async fn test_offline_navigation_after_install_serves_shell() {
    let h = harness();
    h.worker.start().await.unwrap();
    h.network.set_online(false);

    let request = Request::get(http::resolve(ORIGIN, "/blog").unwrap()).with_header("accept", "text/html");
    let WorkerOutcome::Response(served) = h.worker.dispatch(WorkerEvent::Fetch(request)).await.unwrap() else {
      panic!("expected a response");
    };
    assert_eq!(served.source, ResponseSource::Fallback);
    assert_eq!(served.response.body, b"<html>shell</html>");
  }

  #[tokio::test]
  async fn test_sync_only_for_known_tags() {
    let h = harness();
    h.worker.sync().enqueue(&json!({"n": 1})).unwrap();

    let outcome = h
      .worker
      .dispatch(WorkerEvent::Sync {
        tag: "unrelated".to_string(),
      })
      .await
      .unwrap();
    assert!(matches!(outcome, WorkerOutcome::Ignored));

    let outcome = h
      .worker
      .dispatch(WorkerEvent::PeriodicSync {
        tag: "portfolio-sync".to_string(),
      })
      .await
      .unwrap();
    let WorkerOutcome::Synced(report) = outcome else {
      panic!("expected a drain");
    };
    assert_eq!(report.delivered, 1);
  }

  #[tokio::test]
  async fn test_push_then_explore_click() {
    let h = harness();
    let outcome = h.worker.dispatch(WorkerEvent::Push { data: None }).await.unwrap();
    let WorkerOutcome::Notified(Some(id)) = outcome else {
      panic!("expected a notification");
    };

    let visible = h.toasts.visible(Instant::now());
    assert_eq!(visible[0].title, PUSH_TITLE);
    assert_eq!(visible[0].body, PUSH_DEFAULT_BODY);
    assert_eq!(visible[0].options.actions.len(), 2);

    let outcome = h
      .worker
      .dispatch(WorkerEvent::NotificationClick {
        id,
        action: Some("explore".to_string()),
      })
      .await
      .unwrap();
    assert!(matches!(outcome, WorkerOutcome::OpenWindow(ref path) if path == "/"));
    assert!(h.toasts.visible(Instant::now()).is_empty());
  }

  #[tokio::test]
  async fn test_push_body_from_data() {
    let h = harness();
    h.worker
      .dispatch(WorkerEvent::Push {
        data: Some("Nuevo proyecto".to_string()),
      })
      .await
      .unwrap();
    assert_eq!(h.toasts.visible(Instant::now())[0].body, "Nuevo proyecto");
  }

  #[tokio::test]
  async fn test_push_with_empty_data_keeps_it() {
    let h = harness();
    h.worker
      .dispatch(WorkerEvent::Push {
        data: Some(String::new()),
      })
      .await
      .unwrap();
    assert_eq!(h.toasts.visible(Instant::now())[0].body, "");
  }
}
