//! Replays the durable queue against the submission endpoint.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::http::Request;
use crate::network::Network;
use crate::queue::{QueueStore, QueuedRequest};

/// What asked for a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
  /// One-off background sync registration
  Explicit,
  /// Periodic background sync
  Periodic,
  /// The page saw connectivity come back
  Reconnect,
  /// Requested from the command line or the monitor
  Manual,
}

impl fmt::Display for SyncTrigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Explicit => "sync",
      Self::Periodic => "periodic",
      Self::Reconnect => "reconnect",
      Self::Manual => "manual",
    };
    f.write_str(name)
  }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
  pub attempted: usize,
  pub delivered: usize,
  pub failed: usize,
  /// Another drain was already running; nothing was attempted
  pub skipped: bool,
}

impl DrainReport {
  fn skipped() -> Self {
    Self {
      skipped: true,
      ..Self::default()
    }
  }
}

/// Enqueues failed submissions and drains them when asked.
///
/// Drains are single-flight: a drain requested while another runs returns a
/// skipped report instead of racing it. Every delivery also carries an
/// `Idempotency-Key` so a server can drop duplicates across processes.
pub struct SyncCoordinator {
  queue: QueueStore,
  network: Arc<dyn Network>,
  endpoint: Url,
  config: SyncConfig,
  in_flight: Mutex<()>,
}

impl SyncCoordinator {
  pub fn new(queue: QueueStore, network: Arc<dyn Network>, endpoint: Url, config: SyncConfig) -> Self {
    Self {
      queue,
      network,
      endpoint,
      config,
      in_flight: Mutex::new(()),
    }
  }

  pub fn queue(&self) -> &QueueStore {
    &self.queue
  }

  pub fn enqueue(&self, payload: &Value) -> Result<i64> {
    let id = self.queue.enqueue(payload)?;
    info!(id, "Stored request for later sync");
    Ok(id)
  }

  /// Map a sync event tag onto a trigger; unknown tags are ignored.
  pub fn trigger_for_tag(&self, tag: &str, periodic: bool) -> Option<SyncTrigger> {
    match periodic {
      false if tag == self.config.sync_tag => Some(SyncTrigger::Explicit),
      true if tag == self.config.periodic_tag => Some(SyncTrigger::Periodic),
      _ => None,
    }
  }

  /// Attempt delivery of every undelivered record, in order.
  ///
  /// A record that fails stays queued and the pass moves on to the next one.
  pub async fn drain(&self, trigger: SyncTrigger) -> Result<DrainReport> {
    let Ok(_guard) = self.in_flight.try_lock() else {
      debug!(%trigger, "Drain already running, skipping");
      return Ok(DrainReport::skipped());
    };

    let pending = self.queue.list_undelivered()?;
    let mut report = DrainReport {
      attempted: pending.len(),
      ..DrainReport::default()
    };

    for record in &pending {
      match self.deliver(record).await {
        Ok(()) => match self.queue.mark_delivered(record.id) {
          Ok(_) => report.delivered += 1,
          Err(e) => {
            warn!(id = record.id, error = %e, "Delivered but failed to mark");
            report.failed += 1;
          }
        },
        Err(e) => {
          warn!(id = record.id, error = %e, "Failed to sync request");
          report.failed += 1;
        }
      }
    }

    if report.attempted > 0 {
      info!(
        %trigger,
        attempted = report.attempted,
        delivered = report.delivered,
        failed = report.failed,
        "Drain finished"
      );
    }
    Ok(report)
  }

  async fn deliver(&self, record: &QueuedRequest) -> Result<()> {
    let request = Request::post_json(self.endpoint.clone(), &record.payload)?
      .with_header("idempotency-key", &format!("folio-{}", record.id));

    let response = self.network.fetch(&request).await?;
    if !response.is_success() {
      return Err(eyre!("Endpoint answered {}", response.status));
    }
    Ok(())
  }

  /// Drive periodic drains when an interval is configured.
  pub fn spawn_periodic(self: &Arc<Self>) -> Option<JoinHandle<()>> {
    let interval = self.config.periodic_interval?;
    let coordinator = Arc::clone(self);

    Some(tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      // First tick completes immediately
      ticker.tick().await;
      loop {
        ticker.tick().await;
        if let Err(e) = coordinator.drain(SyncTrigger::Periodic).await {
          warn!(error = %e, "Periodic sync failed");
        }
      }
    }))
  }
}
