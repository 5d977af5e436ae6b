mod analytics;
mod app;
mod bridge;
mod cache;
mod config;
mod db;
mod event;
mod host;
mod http;
mod lifecycle;
mod network;
mod notify;
mod queue;
mod strategy;
mod sync;
mod ui;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::bridge::FormOutcome;
use crate::host::Host;
use crate::http::{Method, Request};
use crate::strategy::ResponseSource;
use crate::sync::{DrainReport, SyncTrigger};
use crate::worker::{WorkerEvent, WorkerOutcome};

#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Offline caching and request replay for a portfolio site")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./folio.yaml or $XDG_CONFIG_HOME/folio/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Start with the network switched off
  #[arg(long, global = true)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Preload both caches and take over open pages
  Install,
  /// Drop obsolete cache generations
  Activate,
  /// Route one request through the fetch strategies
  Fetch {
    /// Absolute URL or path on the origin
    url: String,
    #[arg(long)]
    accept: Option<String>,
    #[arg(long, default_value = "GET")]
    method: String,
    /// JSON request body
    #[arg(long)]
    body: Option<String>,
  },
  /// Submit the contact form
  Submit {
    /// Form fields as key=value
    #[arg(required = true)]
    fields: Vec<String>,
  },
  /// Replay queued submissions now
  Sync {
    /// Deliver as a background sync event with this tag
    #[arg(long)]
    tag: Option<String>,
    /// Treat the tag as a periodic sync registration
    #[arg(long, requires = "tag")]
    periodic: bool,
  },
  /// Deliver a push message
  Push {
    /// Notification body; omitted uses the default text
    data: Option<String>,
  },
  /// List queued submissions
  Queue {
    /// Include delivered records
    #[arg(long)]
    all: bool,
    #[command(subcommand)]
    action: Option<QueueAction>,
  },
  /// List cache generations
  Caches,
  /// Show the local usage log
  Events,
  /// Live terminal view
  Monitor,
}

#[derive(Subcommand, Debug)]
enum QueueAction {
  /// Remove delivered records
  Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = config::Config::load(args.config.as_deref())?;
  let _guard = init_tracing(&config.data_dir()?)?;

  let host = Host::open(config, args.offline).await?;

  match args.command {
    Command::Install => match host.worker.start().await? {
      Some(report) => println!(
        "Installed {} (removed {} old caches, claimed {} pages)",
        host.worker.lifecycle().version(),
        report.deleted.len(),
        report.claimed
      ),
      None => println!("Installed {}, waiting", host.worker.lifecycle().version()),
    },
    Command::Activate => {
      if let WorkerOutcome::Activated(report) = host.worker.dispatch(WorkerEvent::Activate).await? {
        for name in &report.deleted {
          println!("deleted {}", name);
        }
        println!("Active version {}", host.worker.lifecycle().version());
      }
    }
    Command::Fetch {
      url,
      accept,
      method,
      body,
    } => {
      let method: Method = method.parse()?;
      let mut request = Request::new(method, http::resolve(&host.config.origin, &url)?);
      if let Some(accept) = accept {
        request = request.with_header("accept", &accept);
      }
      if let Some(body) = body {
        request = request
          .with_header("content-type", "application/json")
          .with_body(body.into_bytes());
      }
      fetch(&host, request).await?;
    }
    Command::Submit { fields } => submit(&host, &fields).await?,
    Command::Sync { tag: None, .. } => {
      print_report(&host.bridge.sync_now(SyncTrigger::Manual).await?)
    }
    Command::Sync {
      tag: Some(tag),
      periodic,
    } => {
      let event = if periodic {
        WorkerEvent::PeriodicSync { tag }
      } else {
        WorkerEvent::Sync { tag }
      };
      match host.worker.dispatch(event).await? {
        WorkerOutcome::Synced(report) => print_report(&report),
        _ => println!("No sync registered under that tag"),
      }
    }
    Command::Push { data } => match host.worker.dispatch(WorkerEvent::Push { data }).await? {
      WorkerOutcome::Notified(Some(id)) => {
        for toast in host.toasts.visible(Instant::now()) {
          if toast.id == id {
            println!("{}\n{}", toast.title, toast.body);
          }
        }
      }
      _ => println!("Notifications are blocked"),
    },
    Command::Queue {
      action: Some(QueueAction::Purge),
      ..
    } => println!("Purged {} delivered records", host.queue.purge_delivered()?),
    Command::Queue { all, action: None } => {
      let records = if all {
        host.queue.list_all()?
      } else {
        host.queue.list_undelivered()?
      };
      for record in records {
        println!(
          "{:<6} {:<9} {} {}",
          record.id,
          if record.delivered { "delivered" } else { "pending" },
          record.created_at.format("%Y-%m-%d %H:%M:%S"),
          record.payload
        );
      }
      println!("{} pending", host.queue.count_undelivered()?);
    }
    Command::Caches => {
      for generation in host.cache.generations()? {
        println!(
          "{} {:<40} {:>5}",
          if generation.current { "*" } else { " " },
          generation.name,
          generation.entries
        );
      }
    }
    Command::Events => {
      for event in host.events.events()? {
        println!(
          "{} {:<16} {} {}",
          event.at.format("%Y-%m-%d %H:%M:%S"),
          event.event,
          event.url,
          event.data
        );
      }
    }
    Command::Monitor => app::App::new(host).run().await?,
  }

  Ok(())
}

/// Log to a daily file under the data directory so the terminal stays clean.
fn init_tracing(data_dir: &Path) -> Result<WorkerGuard> {
  let appender = tracing_appender::rolling::daily(data_dir.join("logs"), "folio.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter = EnvFilter::try_from_env("FOLIO_LOG").unwrap_or_else(|_| EnvFilter::new("folio=info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

async fn fetch(host: &Host, request: Request) -> Result<()> {
  let WorkerOutcome::Response(served) = host.worker.dispatch(WorkerEvent::Fetch(request)).await? else {
    return Err(eyre!("Fetch produced no response"));
  };

  let body = served.response.text();
  println!("{} ({:?})", served.response.status, served.source);
  if let Some(content_type) = served.response.content_type() {
    println!("content-type: {}", content_type);
  }
  println!("{}", ui::truncate(&body, 400));

  // Let a background refresh land before the process exits
  if let Some(revalidation) = served.revalidation {
    revalidation
      .await
      .map_err(|e| eyre!("Revalidation task failed: {}", e))?;
  }
  Ok(())
}

async fn submit(host: &Host, fields: &[String]) -> Result<()> {
  let fields = fields
    .iter()
    .map(|field| {
      field
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| eyre!("Expected key=value, got '{}'", field))
    })
    .collect::<Result<Vec<_>>>()?;

  let outcome = host.bridge.submit_form(&fields)?;
  host.track(
    "form_submit",
    "/",
    json!({"queued": matches!(outcome, FormOutcome::Queued(_))}),
  );
  match outcome {
    FormOutcome::Queued(id) => println!("Offline: stored as #{}", id),
    FormOutcome::Proceed => {
      let payload: Map<String, Value> = fields
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
      let url = http::resolve(&host.config.origin, &host.config.contact_endpoint)?;
      let request = Request::post_json(url, &Value::Object(payload))?;
      let WorkerOutcome::Response(served) = host.worker.dispatch(WorkerEvent::Fetch(request)).await? else {
        return Err(eyre!("Submission produced no response"));
      };
      match served.source {
        ResponseSource::Deferred => println!("{}", served.response.text()),
        _ => println!("Sent ({})", served.response.status),
      }
    }
  }
  Ok(())
}

fn print_report(report: &DrainReport) {
  if report.skipped {
    println!("A sync is already running");
    return;
  }
  println!(
    "Delivered {} of {} ({} failed)",
    report.delivered, report.attempted, report.failed
  );
}
