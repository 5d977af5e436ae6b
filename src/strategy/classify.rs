//! Pure request classification.

use url::Url;

use crate::http::Method;

/// Hosts whose responses are treated as static assets regardless of path.
const ASSET_HOSTS: &[&str] = &[
  "fonts.googleapis.com",
  "fonts.gstatic.com",
  "cdnjs.cloudflare.com",
];

/// Path extensions treated as static assets.
const ASSET_EXTENSIONS: &[&str] = &["css", "js", "mjs", "woff", "woff2", "ttf", "otf"];

/// Closed set of request categories the interceptor distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCategory {
  /// Style sheet, script, font, or a known font/icon host
  StaticAsset,
  /// Accepts HTML
  Document,
  /// Accepts an image
  Image,
  /// Any other GET
  Other,
  /// POST; deferred when the network is unreachable
  Submission,
  /// Any other method; not intercepted
  Passthrough,
}

/// How a GET category is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  CacheFirst,
  NetworkFirst,
  StaleWhileRevalidate,
}

impl RequestCategory {
  pub fn strategy(self) -> Option<Strategy> {
    match self {
      Self::StaticAsset => Some(Strategy::CacheFirst),
      Self::Document | Self::Other => Some(Strategy::NetworkFirst),
      Self::Image => Some(Strategy::StaleWhileRevalidate),
      Self::Submission | Self::Passthrough => None,
    }
  }
}

/// What to synthesize when neither network nor cache can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
  /// The cached root document
  RootDocument,
  /// Inline SVG placeholder
  Placeholder,
  /// 503 "Offline"
  Unavailable,
}

pub fn accepts_html(accept: &str) -> bool {
  accept.contains("text/html")
}

pub fn accepts_image(accept: &str) -> bool {
  accept.contains("image/")
}

fn is_static_asset(url: &Url) -> bool {
  if url
    .host_str()
    .is_some_and(|host| ASSET_HOSTS.contains(&host))
  {
    return true;
  }

  let last = url
    .path_segments()
    .and_then(|mut segments| segments.next_back())
    .unwrap_or("");

  match last.rsplit_once('.') {
    Some((_, ext)) => ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
    None => false,
  }
}

/// Classify a request. Precedence for GET: static asset, then HTML, then image.
/// Only GET is served from caches; HEAD goes straight to the network.
pub fn classify(method: Method, url: &Url, accept: &str) -> RequestCategory {
  match method {
    Method::Get => {}
    Method::Post => return RequestCategory::Submission,
    _ => return RequestCategory::Passthrough,
  }

  if is_static_asset(url) {
    RequestCategory::StaticAsset
  } else if accepts_html(accept) {
    RequestCategory::Document
  } else if accepts_image(accept) {
    RequestCategory::Image
  } else {
    RequestCategory::Other
  }
}

/// Pick the offline fallback from the accept header.
pub fn fallback_for(accept: &str) -> FallbackKind {
  if accepts_html(accept) {
    FallbackKind::RootDocument
  } else if accepts_image(accept) {
    FallbackKind::Placeholder
  } else {
    FallbackKind::Unavailable
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const HTML: &str = "text/html,application/xhtml+xml,*/*;q=0.8";
  const IMAGE: &str = "image/avif,image/webp,*/*";

  fn get(url: &str, accept: &str) -> RequestCategory {
    classify(Method::Get, &Url::parse(url).unwrap(), accept)
  }

  #[test]
  fn test_static_by_extension() {
    assert_eq!(get("https://me.dev/styles/main.css", "text/css"), RequestCategory::StaticAsset);
    assert_eq!(get("https://me.dev/scripts/main.js", "*/*"), RequestCategory::StaticAsset);
    assert_eq!(get("https://me.dev/f/Inter.woff2", "*/*"), RequestCategory::StaticAsset);
  }

  #[test]
  fn test_static_by_host() {
    assert_eq!(
      get("https://fonts.googleapis.com/css2?family=Inter", HTML),
      RequestCategory::StaticAsset
    );
    assert_eq!(
      get("https://cdnjs.cloudflare.com/ajax/libs/x/all.min.css", "*/*"),
      RequestCategory::StaticAsset
    );
  }

  #[test]
  fn test_static_wins_over_accept() {
    assert_eq!(get("https://me.dev/app.js", HTML), RequestCategory::StaticAsset);
  }

  #[test]
  fn test_json_is_not_a_script() {
    assert_eq!(get("https://me.dev/manifest.json", "*/*"), RequestCategory::Other);
  }

  #[test]
  fn test_document_and_image() {
    assert_eq!(get("https://me.dev/", HTML), RequestCategory::Document);
    assert_eq!(get("https://me.dev/photo.jpeg", IMAGE), RequestCategory::Image);
  }

  #[test]
  fn test_html_wins_over_image() {
    assert_eq!(get("https://me.dev/x", "text/html,image/webp"), RequestCategory::Document);
  }

  #[test]
  fn test_methods() {
    let url = Url::parse("https://me.dev/api/contact").unwrap();
    assert_eq!(classify(Method::Post, &url, ""), RequestCategory::Submission);
    assert_eq!(classify(Method::Delete, &url, ""), RequestCategory::Passthrough);
    assert_eq!(
      classify(Method::Head, &Url::parse("https://me.dev/about").unwrap(), "text/html"),
      RequestCategory::Passthrough
    );
    assert_eq!(RequestCategory::Submission.strategy(), None);
  }

  #[test]
  fn test_strategy_mapping() {
    assert_eq!(RequestCategory::StaticAsset.strategy(), Some(Strategy::CacheFirst));
    assert_eq!(RequestCategory::Document.strategy(), Some(Strategy::NetworkFirst));
    assert_eq!(RequestCategory::Other.strategy(), Some(Strategy::NetworkFirst));
    assert_eq!(RequestCategory::Image.strategy(), Some(Strategy::StaleWhileRevalidate));
  }

  #[test]
  fn test_fallback_kinds() {
    assert_eq!(fallback_for(HTML), FallbackKind::RootDocument);
    assert_eq!(fallback_for(IMAGE), FallbackKind::Placeholder);
    assert_eq!(fallback_for("application/json"), FallbackKind::Unavailable);
  }
}
