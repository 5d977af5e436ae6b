//! Network access behind a trait so strategies can run against a fake.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

use crate::http::{Headers, Method, Request, Response};

/// Performs a real round trip.
///
/// A transport failure (DNS, refused connection, reset) is an `Err`.
/// Any HTTP status, including 4xx/5xx, is an `Ok` response.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// `reqwest`-backed network.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Head => reqwest::Method::HEAD,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
    Method::Options => reqwest::Method::OPTIONS,
  }
}

fn to_header_map(headers: &Headers) -> HeaderMap {
  headers
    .iter()
    .filter_map(|(name, value)| {
      let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
      let value = HeaderValue::from_str(value).ok()?;
      Some((name, value))
    })
    .collect()
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let response = self
      .client
      .request(to_reqwest_method(request.method), request.url.clone())
      .headers(to_header_map(&request.headers))
      .body(request.body.clone())
      .send()
      .await
      .map_err(|e| eyre!("Network request to {} failed: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers: Headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body from {}: {}", request.url, e))?
      .to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

/// Wraps a network with a switch that simulates losing connectivity.
pub struct Switchable {
  inner: Arc<dyn Network>,
  offline: AtomicBool,
}

impl Switchable {
  pub fn new(inner: Arc<dyn Network>) -> Self {
    Self {
      inner,
      offline: AtomicBool::new(false),
    }
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn is_forced_offline(&self) -> bool {
    self.offline.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Network for Switchable {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    if self.is_forced_offline() {
      return Err(eyre!("Network request to {} failed: offline", request.url));
    }
    self.inner.fetch(request).await
  }
}

/// Probe reachability of the origin with a HEAD request.
pub async fn probe(network: &dyn Network, origin: &Url) -> bool {
  network
    .fetch(&Request::new(Method::Head, origin.clone()))
    .await
    .is_ok()
}
