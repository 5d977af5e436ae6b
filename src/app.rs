use crate::bridge::{Connectivity, InstallOutcome, UpdateChoice};
use crate::cache::GenerationInfo;
use crate::event::{Event, EventHandler};
use crate::host::Host;
use crate::lifecycle::WorkerState;
use crate::network;
use crate::notify::Notification;
use crate::queue::QueuedRequest;
use crate::sync::SyncTrigger;
use crate::ui;
use crate::worker::{WorkerEvent, WorkerOutcome};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Live view of the worker, the page, the caches and the queue
pub struct App {
  host: Host,

  /// Snapshot refreshed on every tick
  generations: Vec<GenerationInfo>,
  requests: Vec<QueuedRequest>,
  toasts: Vec<Notification>,

  /// Selected row in the queue list
  selected: usize,

  /// Last status message
  status: String,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<Event>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(host: Host) -> Self {
    let (tx, _rx) = mpsc::unbounded_channel();

    Self {
      host,
      generations: Vec::new(),
      requests: Vec::new(),
      toasts: Vec::new(),
      selected: 0,
      status: String::new(),
      event_tx: tx,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(250));
    self.event_tx = events.sender();

    self.start_background();
    self.host.track("page_view", "/", serde_json::json!({"page": "/"}));
    self.refresh();

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      if let Some(event) = events.next().await {
        self.handle_event(event);
      }
    }

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
  }

  /// Worker startup, lifecycle forwarding, connectivity probing and periodic sync.
  fn start_background(&self) {
    let worker = self.host.worker.clone();
    let mut states = worker.lifecycle().subscribe();
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        if tx.send(Event::Worker(state)).is_err() {
          break;
        }
      }
    });

    // The page checks for an update between install and activation, while
    // it is still controlled by the previous version
    let bridge = self.host.bridge.clone();
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      let lifecycle = worker.lifecycle();
      let result = async {
        lifecycle.install().await?;
        bridge.on_worker_state(WorkerState::Installed, lifecycle.version());
        if lifecycle.skips_waiting() {
          lifecycle.activate().await?;
          // A controlled page can be installed
          bridge.on_install_eligible()?;
        }
        Ok::<_, color_eyre::Report>(())
      }
      .await;
      if let Err(e) = result {
        let _ = tx.send(Event::Error(format!("Install failed: {}", e)));
      }
    });

    let network = self.host.network.clone();
    let origin = self.host.origin.clone();
    let interval = self.host.config.network().probe_interval;
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      loop {
        ticker.tick().await;
        let online = network::probe(network.as_ref(), &origin).await;
        if tx.send(Event::Connectivity(online)).is_err() {
          break;
        }
      }
    });

    self.host.worker.sync().spawn_periodic();
  }

  fn refresh(&mut self) {
    match self.host.cache.generations() {
      Ok(generations) => self.generations = generations,
      Err(e) => warn!(error = %e, "Failed to list cache generations"),
    }
    match self.host.queue.list_all() {
      Ok(requests) => self.requests = requests,
      Err(e) => warn!(error = %e, "Failed to list queued requests"),
    }
    self.selected = self.selected.min(self.requests.len().saturating_sub(1));
    self.toasts = self.host.toasts.visible(Instant::now());
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.refresh(),
      Event::Connectivity(online) => self.apply_connectivity(online),
      Event::Worker(state) => {
        debug!(?state, "Worker state");
        self.refresh();
      }
      Event::Synced(report) => {
        self.status = if report.skipped {
          "Sync already running".to_string()
        } else {
          format!(
            "Synced {} of {} ({} failed)",
            report.delivered, report.attempted, report.failed
          )
        };
        self.refresh();
      }
      Event::Status(msg) | Event::Error(msg) => {
        self.status = msg;
        self.refresh();
      }
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }

      KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
      KeyCode::Down | KeyCode::Char('j') => {
        if self.selected + 1 < self.requests.len() {
          self.selected += 1;
        }
      }

      KeyCode::Char('s') => self.spawn_sync(),
      KeyCode::Char('o') => {
        let offline = !self.host.network.is_forced_offline();
        self.host.network.set_offline(offline);
        self.status = if offline {
          "Simulating offline".to_string()
        } else {
          "Network restored".to_string()
        };
        self.apply_connectivity(!offline);
      }
      KeyCode::Char('r') => self.reload_into_update(),
      KeyCode::Char('l') => {
        self.host.bridge.resolve_update(UpdateChoice::Later, None);
        self.status = "Update postponed".to_string();
      }

      // Install prompt
      KeyCode::Char('a') => self.answer_install(InstallOutcome::Accepted),
      KeyCode::Char('n') => self.answer_install(InstallOutcome::Dismissed),
      KeyCode::Char('x') => match self.host.bridge.dismiss_install_banner() {
        Ok(()) => self.status = "Install banner hidden".to_string(),
        Err(e) => self.status = e.to_string(),
      },

      // Notifications
      KeyCode::Char('p') => self.spawn_worker_event(WorkerEvent::Push { data: None }),
      KeyCode::Char('c') => self.click_newest_toast(),
      KeyCode::Char('e') => self.explore_newest_toast(),
      _ => {}
    }
  }

  fn answer_install(&mut self, outcome: InstallOutcome) {
    debug!(prompt = ?self.host.bridge.install_prompt(), ?outcome, "Answering install prompt");
    if !self.host.bridge.resolve_install(outcome) {
      self.status = "No install prompt".to_string();
      return;
    }
    self.host.track(
      "install_prompt",
      "/",
      serde_json::json!({"accepted": outcome == InstallOutcome::Accepted}),
    );
    if outcome == InstallOutcome::Accepted {
      self.host.bridge.on_app_installed();
      self.status = "Installed".to_string();
    } else {
      self.status = "Install declined".to_string();
    }
    self.refresh();
  }

  fn click_newest_toast(&mut self) {
    let Some(toast) = self.toasts.last() else {
      return;
    };
    let outcome = self.host.toasts.click(toast.id);
    self.status = match outcome.open {
      Some(path) => format!("Opening {}", path),
      None if outcome.focus => "Page focused".to_string(),
      None => String::new(),
    };
    self.refresh();
  }

  fn explore_newest_toast(&mut self) {
    let Some(toast) = self.toasts.iter().rev().find(|t| !t.options.actions.is_empty()) else {
      self.status = "No notification with actions".to_string();
      return;
    };
    let action = toast.options.actions.first().map(|a| a.action.clone());
    self.spawn_worker_event(WorkerEvent::NotificationClick { id: toast.id, action });
  }

  /// Run one worker event off the UI loop and report the outcome in the status bar.
  fn spawn_worker_event(&self, event: WorkerEvent) {
    let worker = self.host.worker.clone();
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      let event = match worker.dispatch(event).await {
        Ok(WorkerOutcome::Synced(report)) => Event::Synced(report),
        Ok(WorkerOutcome::OpenWindow(path)) => Event::Status(format!("Opening {}", path)),
        Ok(WorkerOutcome::Notified(None)) => Event::Status("Notifications are blocked".to_string()),
        Ok(_) => Event::Tick,
        Err(e) => Event::Error(e.to_string()),
      };
      let _ = tx.send(event);
    });
  }

  fn apply_connectivity(&self, online: bool) {
    let connectivity = if online {
      Connectivity::Online
    } else {
      Connectivity::Offline
    };
    if self.host.bridge.connectivity() == connectivity {
      return;
    }

    let bridge = self.host.bridge.clone();
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      match bridge.set_connectivity(connectivity).await {
        Ok(Some(report)) => {
          let _ = tx.send(Event::Synced(report));
        }
        Ok(None) => {}
        Err(e) => {
          let _ = tx.send(Event::Error(e.to_string()));
        }
      }
    });
  }

  fn spawn_sync(&mut self) {
    self.status = "Syncing...".to_string();
    let bridge = self.host.bridge.clone();
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      let event = match bridge.sync_now(SyncTrigger::Manual).await {
        Ok(report) => Event::Synced(report),
        Err(e) => Event::Error(e.to_string()),
      };
      let _ = tx.send(event);
    });
  }

  fn reload_into_update(&mut self) {
    let Some(prompt) = self.host.bridge.update_prompt() else {
      self.status = "No update pending".to_string();
      return;
    };

    match self.host.worker.lifecycle().active_version() {
      Ok(active) => {
        self.host.bridge.resolve_update(UpdateChoice::ReloadNow, active);
        self.status = format!("Reloaded into {}", prompt.version);
      }
      Err(e) => self.status = format!("Update failed: {}", e),
    }
  }

  pub fn host(&self) -> &Host {
    &self.host
  }

  pub fn generations(&self) -> &[GenerationInfo] {
    &self.generations
  }

  pub fn requests(&self) -> &[QueuedRequest] {
    &self.requests
  }

  pub fn toasts(&self) -> &[Notification] {
    &self.toasts
  }

  pub fn selected(&self) -> usize {
    self.selected
  }

  pub fn status(&self) -> &str {
    &self.status
  }
}
