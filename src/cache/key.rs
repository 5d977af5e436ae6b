use sha2::{Digest, Sha256};
use url::Url;

use crate::http::{Method, Request};

/// Lookup key for a cached request.
///
/// Two requests share a key when they have the same method and the same URL
/// once the fragment is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  method: Method,
  url: String,
}

impl CacheKey {
  pub fn new(method: Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method,
      url: url.into(),
    }
  }

  pub fn for_request(request: &Request) -> Self {
    Self::new(request.method, &request.url)
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// SHA256 hash for stable, fixed-length storage keys
  pub fn hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}
