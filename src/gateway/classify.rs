//! Request classification for the cache gateway.

use url::Url;

/// Asset extensions served cache-first out of the static partition.
const STATIC_EXTENSIONS: &[&str] = &[
  ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".woff", ".woff2", ".ttf",
];

/// CDN hosts treated as static regardless of path.
const CDN_HOSTS: &[&str] = &["cdnjs.cloudflare.com"];

/// Navigable routes served cache-first out of the page partition.
/// The root path is a page as well.
const PAGE_ROUTES: &[&str] = &["/workspace", "/history", "/profile", "/api-docs"];

/// Caching strategy class of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Cache-first with background revalidation.
  Static,
  /// Network-first with TTL-bounded cache fallback.
  Api,
  /// Cache-first with offline-page fallback.
  Page,
  /// Passed through untouched, never cached.
  Other,
}

/// Classify a URL. Pure function of the URL alone; exactly one class
/// applies. Static wins over the other classes, so a script under /api/
/// is still an asset.
pub fn classify(url: &Url) -> RequestClass {
  let path = url.path();

  if STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    || url.host_str().is_some_and(|host| CDN_HOSTS.contains(&host))
  {
    return RequestClass::Static;
  }

  if path.starts_with("/api/") {
    return RequestClass::Api;
  }

  if path == "/" || PAGE_ROUTES.iter().any(|route| path.starts_with(route)) {
    return RequestClass::Page;
  }

  RequestClass::Other
}
