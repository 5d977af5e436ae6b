//! Page-side counterpart of the worker.
//!
//! Tracks connectivity, defers the contact form while offline, and surfaces
//! the install and update affordances. Deferred submissions go into the same
//! durable queue the worker drains, so there is exactly one queue.

use chrono::Utc;
use color_eyre::Result;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

use crate::db::Database;
use crate::lifecycle::{ClientId, Clients, WorkerState};
use crate::notify::{NotificationOptions, Notifier};
use crate::sync::{DrainReport, SyncCoordinator, SyncTrigger};

const INSTALL_DISMISSED: &str = "installDismissed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

/// Install affordance between the eligibility signal and the user's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPromptState {
  /// Nothing deferred
  Idle,
  /// Deferred prompt held, banner visible
  Deferred,
  /// Deferred prompt held, banner suppressed by an earlier dismissal
  Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
  Accepted,
  Dismissed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePrompt {
  pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateChoice {
  ReloadNow,
  Later,
}

/// Result of intercepting the contact form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
  /// Online: let the submission go through
  Proceed,
  /// Offline: stored under this queue id
  Queued(i64),
}

#[derive(Debug)]
struct PageState {
  connectivity: Connectivity,
  indicator_visible: bool,
  install: InstallPromptState,
  install_banner_visible: bool,
  update: Option<UpdatePrompt>,
}

pub struct ClientBridge {
  sync: Arc<SyncCoordinator>,
  notifier: Arc<dyn Notifier>,
  db: Arc<Database>,
  clients: Clients,
  client: ClientId,
  state: Mutex<PageState>,
}

impl ClientBridge {
  pub fn new(
    sync: Arc<SyncCoordinator>,
    notifier: Arc<dyn Notifier>,
    db: Arc<Database>,
    clients: Clients,
    client: ClientId,
    connectivity: Connectivity,
  ) -> Self {
    notifier.request_permission();
    Self {
      sync,
      notifier,
      db,
      clients,
      client,
      state: Mutex::new(PageState {
        connectivity,
        indicator_visible: connectivity == Connectivity::Offline,
        install: InstallPromptState::Idle,
        install_banner_visible: false,
        update: None,
      }),
    }
  }

  fn page(&self) -> MutexGuard<'_, PageState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn connectivity(&self) -> Connectivity {
    self.page().connectivity
  }

  pub fn is_online(&self) -> bool {
    self.connectivity() == Connectivity::Online
  }

  pub fn offline_indicator_visible(&self) -> bool {
    self.page().indicator_visible
  }

  pub fn install_banner_visible(&self) -> bool {
    self.page().install_banner_visible
  }

  pub fn install_prompt(&self) -> InstallPromptState {
    self.page().install
  }

  pub fn update_prompt(&self) -> Option<UpdatePrompt> {
    self.page().update.clone()
  }

  /// Worker version controlling this page, if any.
  pub fn controller(&self) -> Option<String> {
    self.clients.controller(self.client)
  }

  fn notify(&self, title: &str, body: &str) {
    self
      .notifier
      .show(title, body, NotificationOptions::default());
  }

  /// Apply a connectivity signal. Going online drains the queue and returns
  /// the report; other signals return `None`.
  pub async fn set_connectivity(&self, connectivity: Connectivity) -> Result<Option<DrainReport>> {
    {
      let mut page = self.page();
      if page.connectivity == connectivity {
        return Ok(None);
      }
      page.connectivity = connectivity;
      page.indicator_visible = connectivity == Connectivity::Offline;
    }
    info!(?connectivity, "Connectivity changed");

    if connectivity == Connectivity::Offline {
      return Ok(None);
    }
    self.sync_now(SyncTrigger::Reconnect).await.map(Some)
  }

  /// Drain the queue and tell the user when something went out.
  pub async fn sync_now(&self, trigger: SyncTrigger) -> Result<DrainReport> {
    let report = self.sync.drain(trigger).await?;
    if report.delivered > 0 {
      self.notify("Datos sincronizados", "Tus mensajes han sido enviados");
    }
    Ok(report)
  }

  /// Intercept a contact form submission.
  ///
  /// Offline: the fields plus a client timestamp are queued and a toast is shown.
  pub fn submit_form(&self, fields: &[(String, String)]) -> Result<FormOutcome> {
    if self.is_online() {
      return Ok(FormOutcome::Proceed);
    }

    let mut payload: Map<String, Value> = fields
      .iter()
      .map(|(k, v)| (k.clone(), Value::String(v.clone())))
      .collect();
    payload.insert("timestamp".to_string(), Value::from(Utc::now().timestamp_millis()));

    let id = self.sync.enqueue(&Value::Object(payload))?;
    self.notify("Mensaje guardado", "Se enviará cuando tengas conexión");
    Ok(FormOutcome::Queued(id))
  }

  /// The platform says the app can be installed.
  pub fn on_install_eligible(&self) -> Result<()> {
    let dismissed = self.db.preference(INSTALL_DISMISSED)?.is_some();
    let mut page = self.page();
    if dismissed {
      page.install = InstallPromptState::Suppressed;
    } else {
      page.install = InstallPromptState::Deferred;
      page.install_banner_visible = true;
    }
    Ok(())
  }

  /// The user answered the deferred prompt. Both outcomes clear it.
  pub fn resolve_install(&self, outcome: InstallOutcome) -> bool {
    {
      let mut page = self.page();
      if page.install == InstallPromptState::Idle {
        return false;
      }
      page.install = InstallPromptState::Idle;
      page.install_banner_visible = false;
    }

    if outcome == InstallOutcome::Accepted {
      self.notify(
        "¡Aplicación instalada!",
        "Ya puedes acceder desde tu pantalla de inicio",
      );
    }
    true
  }

  /// The user closed the banner without deciding; remembered across runs.
  pub fn dismiss_install_banner(&self) -> Result<()> {
    self.page().install_banner_visible = false;
    self.db.set_preference(INSTALL_DISMISSED, "true")
  }

  pub fn on_app_installed(&self) {
    {
      let mut page = self.page();
      page.install = InstallPromptState::Idle;
      page.install_banner_visible = false;
    }
    self.notify("¡Bienvenido!", "Portafolio instalado correctamente");
  }

  /// A worker changed state. A new version reaching `Installed` while this
  /// page is already controlled raises the update prompt.
  pub fn on_worker_state(&self, state: WorkerState, version: &str) {
    if state != WorkerState::Installed {
      return;
    }
    match self.clients.controller(self.client) {
      Some(current) if current != version => {
        info!(%version, "Nueva versión disponible");
        self.page().update = Some(UpdatePrompt {
          version: version.to_string(),
        });
      }
      _ => {}
    }
  }

  /// Answer the update prompt. `Later` drops it with no retry.
  pub fn resolve_update(&self, choice: UpdateChoice, active: Option<String>) {
    let Some(prompt) = self.page().update.take() else {
      warn!("No update pending");
      return;
    };
    if choice == UpdateChoice::ReloadNow {
      info!(version = %prompt.version, "Reloading into new version");
      self.clients.reload(self.client, active);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::http::Response;
  use crate::network::testing::FakeNetwork;
  use crate::notify::{Permission, Toasts};
  use crate::queue::QueueStore;
  use std::time::Instant;
  use url::Url;

  const ENDPOINT: &str = "https://me.dev/api/contact";

  struct Page {
    bridge: ClientBridge,
    network: Arc<FakeNetwork>,
    toasts: Arc<Toasts>,
    sync: Arc<SyncCoordinator>,
    clients: Clients,
    db: Arc<Database>,
  }

  fn page(connectivity: Connectivity, controller: Option<&str>) -> Page {
    let db = Arc::new(Database::open_in_memory().unwrap());
    page_with_db(db, connectivity, controller)
  }

  fn page_with_db(db: Arc<Database>, connectivity: Connectivity, controller: Option<&str>) -> Page {
    let network = Arc::new(FakeNetwork::online());
    network.route(ENDPOINT, Response::ok("{}"));
    let sync = Arc::new(SyncCoordinator::new(
      QueueStore::new(db.clone()),
      network.clone(),
      Url::parse(ENDPOINT).unwrap(),
      Config::default().sync(),
    ));
    let toasts = Arc::new(Toasts::new(Permission::Granted));
    let clients = Clients::default();
    let client = clients.open(controller.map(String::from));
    let bridge = ClientBridge::new(
      sync.clone(),
      toasts.clone(),
      db.clone(),
      clients.clone(),
      client,
      connectivity,
    );
    Page {
      bridge,
      network,
      toasts,
      sync,
      clients,
      db,
    }
  }

  fn fields() -> Vec<(String, String)> {
    vec![
      ("name".to_string(), "Ana".to_string()),
      ("message".to_string(), "Hola".to_string()),
    ]
  }

  fn toast_titles(toasts: &Toasts) -> Vec<String> {
    toasts
      .visible(Instant::now())
      .into_iter()
      .map(|n| n.title)
      .collect()
  }

  #[tokio::test]
  async fn test_offline_form_is_queued_with_timestamp() {
    let p = page(Connectivity::Offline, None);
    assert!(p.bridge.offline_indicator_visible());

    let outcome = p.bridge.submit_form(&fields()).unwrap();
    let FormOutcome::Queued(id) = outcome else {
      panic!("expected the form to be queued");
    };

    let record = p.sync.queue().get(id).unwrap().unwrap();
    assert_eq!(record.payload["name"], "Ana");
    assert!(record.payload["timestamp"].is_i64());
    assert_eq!(toast_titles(&p.toasts), vec!["Mensaje guardado".to_string()]);
  }

  #[tokio::test]
  async fn test_online_form_proceeds() {
    let p = page(Connectivity::Online, None);
    assert_eq!(p.bridge.submit_form(&fields()).unwrap(), FormOutcome::Proceed);
    assert_eq!(p.sync.queue().count_undelivered().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_reconnect_hides_indicator_and_delivers() {
    let p = page(Connectivity::Offline, None);
    p.bridge.submit_form(&fields()).unwrap();
    p.bridge.submit_form(&fields()).unwrap();

    let report = p
      .bridge
      .set_connectivity(Connectivity::Online)
      .await
      .unwrap()
      .unwrap();

    assert!(!p.bridge.offline_indicator_visible());
    assert_eq!(report.delivered, 2);
    assert_eq!(p.network.call_count(), 2);
    assert_eq!(p.sync.queue().count_undelivered().unwrap(), 0);
    assert_eq!(toast_titles(&p.toasts), vec!["Datos sincronizados".to_string()]);
  }

  #[tokio::test]
  async fn test_repeated_signal_is_not_a_transition() {
    let p = page(Connectivity::Online, None);
    assert!(p.bridge.set_connectivity(Connectivity::Online).await.unwrap().is_none());

    assert!(p.bridge.set_connectivity(Connectivity::Offline).await.unwrap().is_none());
    assert!(p.bridge.offline_indicator_visible());
    assert_eq!(p.network.call_count(), 0);
  }

  #[tokio::test]
  async fn test_install_accept_clears_prompt() {
    let p = page(Connectivity::Online, None);
    p.bridge.on_install_eligible().unwrap();
    assert_eq!(p.bridge.install_prompt(), InstallPromptState::Deferred);
    assert!(p.bridge.install_banner_visible());

    assert!(p.bridge.resolve_install(InstallOutcome::Accepted));
    assert_eq!(p.bridge.install_prompt(), InstallPromptState::Idle);
    assert!(!p.bridge.install_banner_visible());
    assert_eq!(toast_titles(&p.toasts), vec!["¡Aplicación instalada!".to_string()]);

    // Nothing left to answer
    assert!(!p.bridge.resolve_install(InstallOutcome::Dismissed));
  }

  #[tokio::test]
  async fn test_dismissed_banner_stays_hidden_next_time() {
    let p = page(Connectivity::Online, None);
    p.bridge.on_install_eligible().unwrap();
    p.bridge.dismiss_install_banner().unwrap();

    let next = page_with_db(p.db.clone(), Connectivity::Online, None);
    next.bridge.on_install_eligible().unwrap();
    assert_eq!(next.bridge.install_prompt(), InstallPromptState::Suppressed);
    assert!(!next.bridge.install_banner_visible());
  }

  #[tokio::test]
  async fn test_update_prompt_only_for_controlled_page() {
    let fresh = page(Connectivity::Online, None);
    fresh.bridge.on_worker_state(WorkerState::Installed, "2");
    assert!(fresh.bridge.update_prompt().is_none());

    let p = page(Connectivity::Online, Some("1"));
    p.bridge.on_worker_state(WorkerState::Activating, "2");
    assert!(p.bridge.update_prompt().is_none());

    p.bridge.on_worker_state(WorkerState::Installed, "2");
    assert_eq!(
      p.bridge.update_prompt(),
      Some(UpdatePrompt {
        version: "2".to_string()
      })
    );

    p.bridge.resolve_update(UpdateChoice::ReloadNow, Some("2".to_string()));
    assert!(p.bridge.update_prompt().is_none());
    assert_eq!(p.bridge.controller().as_deref(), Some("2"));
  }

  #[tokio::test]
  async fn test_update_later_keeps_old_controller() {
    let p = page(Connectivity::Online, Some("1"));
    p.bridge.on_worker_state(WorkerState::Installed, "2");
    p.bridge.resolve_update(UpdateChoice::Later, Some("2".to_string()));

    assert!(p.bridge.update_prompt().is_none());
    assert_eq!(p.bridge.controller().as_deref(), Some("1"));
  }
}
