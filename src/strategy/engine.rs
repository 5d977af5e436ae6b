//! Fetch interception: classify, apply a strategy, fall back when offline.

use color_eyre::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::classify::{classify, fallback_for, FallbackKind, RequestCategory, Strategy};
use crate::cache::{Bucket, CacheKey, CacheManager, CachedEntry};
use crate::http::{Method, Request, Response};
use crate::network::Network;
use crate::sync::SyncCoordinator;

/// Acknowledgement message for a deferred submission.
pub const DEFERRED_MESSAGE: &str = "Mensaje guardado. Se enviará cuando tengas conexión.";

const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200" viewBox="0 0 200 200"><rect width="200" height="200" fill="#f0f0f0"/><text x="50%" y="50%" text-anchor="middle" dy=".3em" fill="#999">Sin conexión</text></svg>"##;

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  Network,
  Cache,
  /// Synthesized because neither network nor cache could answer
  Fallback,
  /// Submission stored for later delivery
  Deferred,
}

/// A response handed back to the page.
#[derive(Debug)]
pub struct Served {
  pub response: Response,
  pub source: ResponseSource,
  /// Background refresh started by stale-while-revalidate
  pub revalidation: Option<JoinHandle<()>>,
}

impl Served {
  fn new(response: Response, source: ResponseSource) -> Self {
    Self {
      response,
      source,
      revalidation: None,
    }
  }
}

/// Applies the per-category strategy to every intercepted request.
#[derive(Clone)]
pub struct FetchEngine {
  cache: CacheManager,
  network: Arc<dyn Network>,
  sync: Arc<SyncCoordinator>,
  root_document: Url,
}

impl FetchEngine {
  pub fn new(
    cache: CacheManager,
    network: Arc<dyn Network>,
    sync: Arc<SyncCoordinator>,
    root_document: Url,
  ) -> Self {
    Self {
      cache,
      network,
      sync,
      root_document,
    }
  }

  /// Serve one request.
  ///
  /// GET requests only fail when stale-while-revalidate has nothing cached
  /// and the network rejects. Submissions fail only when the durable queue does.
  pub async fn handle(&self, request: Request) -> Result<Served> {
    let category = classify(request.method, &request.url, request.accept());
    debug!(method = %request.method, url = %request.url, ?category, "Intercepted request");

    match category {
      RequestCategory::Submission => self.submit(request).await,
      RequestCategory::Passthrough => {
        let response = self.network.fetch(&request).await?;
        Ok(Served::new(response, ResponseSource::Network))
      }
      _ => match category.strategy() {
        Some(Strategy::CacheFirst) => Ok(self.cache_first(request).await),
        Some(Strategy::StaleWhileRevalidate) => self.stale_while_revalidate(request).await,
        _ => Ok(self.network_first(request).await),
      },
    }
  }

  fn lookup(&self, key: &CacheKey) -> Option<CachedEntry> {
    match self.cache.match_key(key) {
      Ok(Some(entry)) => {
        debug!(url = %entry.url, cached_at = %entry.cached_at, "Cache hit");
        Some(entry)
      }
      Ok(None) => None,
      Err(e) => {
        warn!(url = key.url(), error = %e, "Cache lookup failed, treating as miss");
        None
      }
    }
  }

  async fn cache_first(&self, request: Request) -> Served {
    let key = CacheKey::for_request(&request);
    if let Some(entry) = self.lookup(&key) {
      return Served::new(entry.response, ResponseSource::Cache);
    }

    match self.network.fetch(&request).await {
      Ok(response) => {
        self.cache.put_best_effort(Bucket::Static, &key, &response);
        Served::new(response, ResponseSource::Network)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network failed on cache miss");
        self.offline_fallback(&request)
      }
    }
  }

  async fn network_first(&self, request: Request) -> Served {
    let key = CacheKey::for_request(&request);
    match self.network.fetch(&request).await {
      Ok(response) => {
        self.cache.put_best_effort(Bucket::Dynamic, &key, &response);
        Served::new(response, ResponseSource::Network)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network failed, trying cache");
        match self.lookup(&key) {
          Some(entry) => Served::new(entry.response, ResponseSource::Cache),
          None => self.offline_fallback(&request),
        }
      }
    }
  }

  async fn stale_while_revalidate(&self, request: Request) -> Result<Served> {
    let key = CacheKey::for_request(&request);

    match self.lookup(&key) {
      Some(entry) => {
        let cache = self.cache.clone();
        let network = Arc::clone(&self.network);
        let revalidation = tokio::spawn(async move {
          match network.fetch(&request).await {
            Ok(response) => cache.put_best_effort(Bucket::Dynamic, &key, &response),
            Err(e) => debug!(url = %request.url, error = %e, "Revalidation failed"),
          }
        });

        Ok(Served {
          response: entry.response,
          source: ResponseSource::Cache,
          revalidation: Some(revalidation),
        })
      }
      None => {
        let response = self.network.fetch(&request).await?;
        self.cache.put_best_effort(Bucket::Dynamic, &key, &response);
        Ok(Served::new(response, ResponseSource::Network))
      }
    }
  }

  async fn submit(&self, request: Request) -> Result<Served> {
    match self.network.fetch(&request).await {
      Ok(response) => Ok(Served::new(response, ResponseSource::Network)),
      Err(e) => {
        warn!(url = %request.url, error = %e, "Submission failed, deferring");
        self.sync.enqueue(&payload_of(&request.body))?;
        Ok(Served::new(deferred_ack(), ResponseSource::Deferred))
      }
    }
  }

  fn offline_fallback(&self, request: &Request) -> Served {
    let response = match fallback_for(request.accept()) {
      FallbackKind::RootDocument => {
        let key = CacheKey::new(Method::Get, &self.root_document);
        match self.lookup(&key) {
          Some(entry) => entry.response,
          None => unavailable(),
        }
      }
      FallbackKind::Placeholder => placeholder_image(),
      FallbackKind::Unavailable => unavailable(),
    };
    Served::new(response, ResponseSource::Fallback)
  }
}

/// JSON bodies are replayed as-is; anything else is kept as a string.
fn payload_of(body: &[u8]) -> Value {
  serde_json::from_slice(body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

pub fn deferred_ack() -> Response {
  Response::json(
    202,
    &json!({
      "success": false,
      "message": DEFERRED_MESSAGE,
      "offline": true,
    }),
  )
}

pub fn placeholder_image() -> Response {
  Response::ok(PLACEHOLDER_SVG).with_header("content-type", "image/svg+xml")
}

pub fn unavailable() -> Response {
  Response::new(503, "Offline").with_header("content-type", "text/plain")
}
