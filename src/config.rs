use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_STATIC_MANIFEST: &[&str] = &[
  "/",
  "/index.html",
  "/styles/main.css",
  "/styles/animations.css",
  "/scripts/main.js",
  "/scripts/animations.js",
  "/main.js",
  "/manifest.json",
  "/custom/logo-16x16.png",
  "/custom/logo-32x32.png",
  "/custom/logo-64x64.png",
  "/custom/logo-128x128.png",
  "/custom/logo-192x192.png",
  "/custom/logo-256x256.png",
  "/custom/logo-384x384.png",
  "/custom/logo-512x512.png",
  "/custom/logo-1024x1024.png",
  "https://fonts.googleapis.com/css2?family=Poppins:wght@300;400;600;700&family=Inter:wght@300;400;500;600&display=swap",
  "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
];

const DEFAULT_DYNAMIC_MANIFEST: &[&str] = &[
  "https://images.pexels.com/photos/220453/pexels-photo-220453.jpeg",
  "https://images.pexels.com/photos/2379005/pexels-photo-2379005.jpeg",
  "https://images.pexels.com/photos/326503/pexels-photo-326503.jpeg",
  "https://images.pexels.com/photos/270348/pexels-photo-270348.jpeg",
  "https://images.pexels.com/photos/196644/pexels-photo-196644.jpeg",
];

/// Top-level configuration. Built once at startup and never mutated;
/// each component receives only the slice it needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Application name used as the cache generation prefix
  pub app: String,
  /// Cache generation version; bumping it invalidates every cache
  pub version: String,
  /// Origin that root-relative paths resolve against
  pub origin: String,
  pub static_manifest: Vec<String>,
  pub dynamic_manifest: Vec<String>,
  pub contact_endpoint: String,
  pub sync_tag: String,
  pub periodic_sync_tag: String,
  /// Periodic sync interval; disabled when unset
  pub periodic_sync_minutes: Option<u64>,
  /// Connectivity probe interval for the monitor
  pub probe_seconds: u64,
  /// Where the cache and queue databases live
  pub data_dir: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      app: "portfolio".to_string(),
      version: "1.0.0".to_string(),
      origin: "http://localhost:8080".to_string(),
      static_manifest: DEFAULT_STATIC_MANIFEST.iter().map(|s| s.to_string()).collect(),
      dynamic_manifest: DEFAULT_DYNAMIC_MANIFEST.iter().map(|s| s.to_string()).collect(),
      contact_endpoint: "/api/contact".to_string(),
      sync_tag: "background-sync".to_string(),
      periodic_sync_tag: "portfolio-sync".to_string(),
      periodic_sync_minutes: None,
      probe_seconds: 10,
      data_dir: None,
    }
  }
}

/// Cache generation names and preload manifests.
#[derive(Debug, Clone)]
pub struct CacheConfig {
  pub static_name: String,
  pub dynamic_name: String,
  pub static_manifest: Vec<String>,
  pub dynamic_manifest: Vec<String>,
  /// Key of the root document served as the HTML offline fallback
  pub root_document: String,
}

impl CacheConfig {
  /// Names of the two live generations.
  pub fn current_names(&self) -> [&str; 2] {
    [&self.static_name, &self.dynamic_name]
  }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
  pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
  pub sync_tag: String,
  pub periodic_tag: String,
  pub periodic_interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
  pub probe_interval: Duration,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./folio.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/folio/config.yaml
  ///
  /// Falls back to the built-in defaults when nothing is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    Ok(config.with_env_overrides())
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("folio.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("folio").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.version.trim().is_empty() {
      return Err(eyre!("version must not be empty"));
    }
    Ok(config)
  }

  fn with_env_overrides(self) -> Self {
    match std::env::var("FOLIO_ORIGIN") {
      Ok(origin) if !origin.is_empty() => Self { origin, ..self },
      _ => self,
    }
  }

  /// Directory holding the databases and log files.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("folio"))
  }

  /// `<app>-<bucket>-v<version>`
  pub fn generation_name(&self, bucket: &str) -> String {
    format!("{}-{}-v{}", self.app, bucket, self.version)
  }

  pub fn cache(&self) -> CacheConfig {
    CacheConfig {
      static_name: self.generation_name("static"),
      dynamic_name: self.generation_name("dynamic"),
      static_manifest: self.static_manifest.clone(),
      dynamic_manifest: self.dynamic_manifest.clone(),
      root_document: "/index.html".to_string(),
    }
  }

  pub fn queue(&self) -> Result<QueueConfig> {
    Ok(QueueConfig {
      path: self.data_dir()?.join("queue.db"),
    })
  }

  pub fn sync(&self) -> SyncConfig {
    SyncConfig {
      sync_tag: self.sync_tag.clone(),
      periodic_tag: self.periodic_sync_tag.clone(),
      periodic_interval: self
        .periodic_sync_minutes
        .filter(|m| *m > 0)
        .map(|m| Duration::from_secs(m * 60)),
    }
  }

  pub fn network(&self) -> NetworkConfig {
    NetworkConfig {
      probe_interval: Duration::from_secs(self.probe_seconds.max(1)),
    }
  }
}
