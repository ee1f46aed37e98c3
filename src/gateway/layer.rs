//! Cache gateway orchestrating per-class strategies over named partitions.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use reqwest::Method;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::classify::{classify, RequestClass};
use super::fetcher::{FetchedResponse, Fetcher};
use super::store::{CacheStore, CachedResponse};

/// Partition names. Bumping the version retires every existing partition
/// at the next activation.
pub const STATIC_PARTITION: &str = "m3d-static-v1";
pub const API_PARTITION: &str = "m3d-api-v1";
pub const PAGE_PARTITION: &str = "m3d-pages-v1";

/// The partitions allowed to survive activation. Exactly these three are
/// live at a time; anything else is garbage from a previous version.
const EXPECTED_PARTITIONS: &[&str] = &[STATIC_PARTITION, API_PARTITION, PAGE_PARTITION];

/// API cache entries older than this must not be served without
/// revalidation.
const API_TTL_MS: i64 = 300_000;

/// Cadence of the background sweep that evicts expired API entries.
pub const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_millis(600_000);

/// Assets fetched into the cache at install time, resolved against the
/// server base URL.
const DEFAULT_MANIFEST: &[&str] = &[
  "/",
  "/workspace",
  "/history",
  "/profile",
  "/api-docs",
  "/offline.html",
  "/css/responsive.css",
  "/js/responsive.js",
  "/js/performance.js",
  "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
];

const OFFLINE_PAGE_PATH: &str = "/offline.html";

/// Synthetic body returned when the network is down and nothing cached
/// can stand in.
const UNAVAILABLE_BODY: &str =
  r#"{"error":"Network unavailable","message":"Network connection unavailable, please check your connection and retry"}"#;

/// Minimal offline document returned when a navigation fails and no
/// cached page can stand in.
const OFFLINE_FALLBACK_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Offline</title>
  <meta charset="UTF-8">
</head>
<body>
  <h1>Offline</h1>
  <p>The network is unavailable. Check your connection and retry.</p>
</body>
</html>
"#;

/// Where a gateway response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh data from network
  Network,
  /// Served from a cache partition
  Cache,
  /// Offline fallback document
  Offline,
  /// Synthetic error generated by the gateway itself
  Synthetic,
}

/// Response resolved by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub source: ResponseSource,
}

impl GatewayResponse {
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  fn from_network(response: FetchedResponse) -> Self {
    Self {
      status: response.status,
      content_type: response.content_type,
      body: response.body,
      source: ResponseSource::Network,
    }
  }

  fn from_cache(cached: CachedResponse) -> Self {
    Self {
      status: cached.status,
      content_type: cached.content_type,
      body: cached.body,
      source: ResponseSource::Cache,
    }
  }

  fn offline(cached: CachedResponse) -> Self {
    Self {
      source: ResponseSource::Offline,
      ..Self::from_cache(cached)
    }
  }

  fn offline_document() -> Self {
    Self {
      status: 200,
      content_type: Some("text/html".to_string()),
      body: OFFLINE_FALLBACK_HTML.as_bytes().to_vec(),
      source: ResponseSource::Offline,
    }
  }

  fn unavailable() -> Self {
    Self {
      status: 503,
      content_type: Some("application/json".to_string()),
      body: UNAVAILABLE_BODY.as_bytes().to_vec(),
      source: ResponseSource::Synthetic,
    }
  }
}

/// Commands accepted over the gateway's control channel. Each is
/// idempotent and carries no response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayCommand {
  /// Go live immediately, without waiting for a fresh install.
  Activate,
  /// Drop every cache partition.
  ClearCache,
  /// Re-populate the static and page partitions from the manifest.
  RefreshStatic,
}

/// A request as seen by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
  pub method: Method,
  pub url: Url,
  /// Document navigations fall back to the offline page on failure.
  pub navigation: bool,
}

impl GatewayRequest {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      navigation: false,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn navigate(url: Url) -> Self {
    Self {
      navigation: true,
      ..Self::get(url)
    }
  }
}

/// Decides, per intercepted GET, whether to serve from cache, from the
/// network, or both, and keeps the partitions bounded in time.
///
/// Classified GETs always resolve to *some* response: network failures
/// degrade to a cache lookup, an offline fallback, or a synthetic error.
/// Non-GET requests and unclassified URLs pass through untouched.
#[derive(Clone)]
pub struct CacheGateway {
  store: Arc<dyn CacheStore>,
  fetcher: Arc<dyn Fetcher>,
  base: Url,
  manifest: Arc<Vec<String>>,
  ttl: Duration,
  active: Arc<AtomicBool>,
}

impl CacheGateway {
  pub fn new(store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>, base: Url) -> Self {
    Self {
      store,
      fetcher,
      base,
      manifest: Arc::new(DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect()),
      ttl: Duration::milliseconds(API_TTL_MS),
      active: Arc::new(AtomicBool::new(false)),
    }
  }

  /// Replace the install manifest.
  pub fn with_manifest(mut self, manifest: Vec<String>) -> Self {
    self.manifest = Arc::new(manifest);
    self
  }

  pub fn is_active(&self) -> bool {
    self.active.load(Ordering::SeqCst)
  }

  /// Whether the static partition has never been populated.
  pub fn needs_install(&self) -> Result<bool> {
    Ok(self.store.urls(STATIC_PARTITION)?.is_empty())
  }

  /// Populate the static and page partitions from the asset manifest.
  ///
  /// All-or-nothing: a single failed fetch fails the whole install and
  /// stores nothing from this run. Previously stored entries are left in
  /// place.
  pub async fn install(&self) -> Result<()> {
    let urls: Vec<Url> = self
      .manifest
      .iter()
      .map(|entry| self.resolve(entry))
      .collect::<Result<_>>()?;

    let responses = try_join_all(urls.into_iter().map(|url| {
      let fetcher = Arc::clone(&self.fetcher);
      async move {
        let response = fetcher
          .fetch(Method::GET, &url)
          .await
          .map_err(|e| eyre!("install fetch for {} failed: {}", url, e))?;
        if !response.is_ok() {
          return Err(eyre!("install fetch for {} returned {}", url, response.status));
        }
        Ok::<_, color_eyre::Report>((url, response))
      }
    }))
    .await?;

    for (url, response) in responses {
      let partition = match classify(&url) {
        RequestClass::Page => PAGE_PARTITION,
        _ => STATIC_PARTITION,
      };
      self.store.put(partition, url.as_str(), &capture(&response))?;
    }

    Ok(())
  }

  /// Retire partitions from previous versions, then go live immediately.
  pub fn activate(&self) -> Result<()> {
    for name in self.store.partitions()? {
      if !EXPECTED_PARTITIONS.contains(&name.as_str()) {
        debug!(partition = %name, "deleting old cache partition");
        self.store.drop_partition(&name)?;
      }
    }
    self.active.store(true, Ordering::SeqCst);
    Ok(())
  }

  /// Resolve one request to a response.
  ///
  /// Until the gateway is active, and for non-GET or unclassified
  /// requests, this is a plain passthrough whose failures propagate.
  pub async fn handle_fetch(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
    if request.method != Method::GET || !self.is_active() {
      return self.passthrough(request).await;
    }

    match classify(&request.url) {
      RequestClass::Static => self.cache_first(STATIC_PARTITION, request).await,
      RequestClass::Page => self.cache_first(PAGE_PARTITION, request).await,
      RequestClass::Api => Ok(self.network_first(request).await),
      RequestClass::Other => self.passthrough(request).await,
    }
  }

  /// Handle a control command.
  pub async fn handle_message(&self, command: GatewayCommand) -> Result<()> {
    match command {
      GatewayCommand::Activate => {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
      }
      GatewayCommand::ClearCache => {
        for name in self.store.partitions()? {
          self.store.drop_partition(&name)?;
        }
        Ok(())
      }
      GatewayCommand::RefreshStatic => self.install().await,
    }
  }

  /// Evict expired API entries, independent of request activity.
  pub fn sweep(&self) -> Result<usize> {
    let cutoff = Utc::now() - self.ttl;
    let mut evicted = 0;

    for url in self.store.urls(API_PARTITION)? {
      if let Some(entry) = self.store.get(API_PARTITION, &url)? {
        if entry.captured_at < cutoff {
          self.store.delete(API_PARTITION, &url)?;
          evicted += 1;
        }
      }
    }

    if evicted > 0 {
      debug!(evicted, "swept expired api cache entries");
    }
    Ok(evicted)
  }

  /// Run the sweep on a fixed interval until the returned task is
  /// dropped or aborted.
  pub fn spawn_maintenance(&self) -> tokio::task::JoinHandle<()> {
    let gateway = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
      // The first interval tick completes immediately; the sweep should
      // first run one full period from now.
      ticker.tick().await;
      loop {
        ticker.tick().await;
        if let Err(err) = gateway.sweep() {
          warn!(error = %err, "cache sweep failed");
        }
      }
    })
  }

  // ==========================================================================
  // Strategies
  // ==========================================================================

  /// Cache-first with background revalidation.
  async fn cache_first(
    &self,
    partition: &'static str,
    request: &GatewayRequest,
  ) -> Result<GatewayResponse> {
    let key = request.url.as_str();

    if let Some(cached) = self.lookup(partition, key) {
      // Serve stale-while-revalidate: refresh in the background, return
      // the cached entry immediately.
      self.spawn_revalidate(partition, request.url.clone());
      return Ok(GatewayResponse::from_cache(cached));
    }

    match self.fetcher.fetch(Method::GET, &request.url).await {
      Ok(response) => {
        if response.is_ok() {
          self.store_response(partition, key, &response);
        }
        Ok(GatewayResponse::from_network(response))
      }
      Err(err) => {
        warn!(url = %request.url, error = %err, "fetch failed");
        if request.navigation || partition == PAGE_PARTITION {
          Ok(self.offline_fallback())
        } else {
          Err(eyre!("request to {} failed: {}", request.url, err))
        }
      }
    }
  }

  /// Network-first with TTL-bounded cache fallback.
  async fn network_first(&self, request: &GatewayRequest) -> GatewayResponse {
    let key = request.url.as_str();

    match self.fetcher.fetch(Method::GET, &request.url).await {
      Ok(response) => {
        if response.is_ok() {
          self.store_response(API_PARTITION, key, &response);
        }
        GatewayResponse::from_network(response)
      }
      Err(err) => {
        warn!(url = %request.url, error = %err, "network failed, trying api cache");

        if let Some(cached) = self.lookup(API_PARTITION, key) {
          if is_fresh(cached.captured_at, Utc::now(), self.ttl) {
            return GatewayResponse::from_cache(cached);
          }
          // Expired: evict, never serve without revalidation.
          if let Err(err) = self.store.delete(API_PARTITION, key) {
            warn!(url = key, error = %err, "failed to evict expired entry");
          }
        }

        GatewayResponse::unavailable()
      }
    }
  }

  async fn passthrough(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
    let response = self
      .fetcher
      .fetch(request.method.clone(), &request.url)
      .await
      .map_err(|e| eyre!("request to {} failed: {}", request.url, e))?;
    Ok(GatewayResponse::from_network(response))
  }

  // ==========================================================================
  // Helpers
  // ==========================================================================

  /// Best-effort offline fallback: the pre-stored offline page, then the
  /// cached root document, then a built-in offline document.
  fn offline_fallback(&self) -> GatewayResponse {
    for path in [OFFLINE_PAGE_PATH, "/"] {
      if let Ok(url) = self.base.join(path) {
        for partition in [PAGE_PARTITION, STATIC_PARTITION] {
          if let Some(cached) = self.lookup(partition, url.as_str()) {
            return GatewayResponse::offline(cached);
          }
        }
      }
    }
    GatewayResponse::offline_document()
  }

  /// Refresh one cached entry from the network without blocking the
  /// caller. Failures are logged, never surfaced.
  fn spawn_revalidate(&self, partition: &'static str, url: Url) {
    let gateway = self.clone();
    tokio::spawn(async move {
      match gateway.fetcher.fetch(Method::GET, &url).await {
        Ok(response) if response.is_ok() => {
          gateway.store_response(partition, url.as_str(), &response);
        }
        Ok(response) => {
          debug!(%url, status = response.status, "background refresh skipped");
        }
        Err(err) => {
          debug!(%url, error = %err, "background refresh failed");
        }
      }
    });
  }

  /// Cache reads degrade to a miss instead of failing the request.
  fn lookup(&self, partition: &str, url: &str) -> Option<CachedResponse> {
    match self.store.get(partition, url) {
      Ok(entry) => entry,
      Err(err) => {
        warn!(%url, error = %err, "cache read failed");
        None
      }
    }
  }

  /// Cache writes degrade to a log line instead of failing the request.
  fn store_response(&self, partition: &str, url: &str, response: &FetchedResponse) {
    if let Err(err) = self.store.put(partition, url, &capture(response)) {
      warn!(%url, error = %err, "cache write failed");
    }
  }

  fn resolve(&self, entry: &str) -> Result<Url> {
    let parsed = if entry.starts_with("http://") || entry.starts_with("https://") {
      Url::parse(entry)
    } else {
      self.base.join(entry)
    };
    parsed.map_err(|e| eyre!("bad manifest entry {}: {}", entry, e))
  }
}

/// Capture a network response with a timestamp for TTL bookkeeping.
fn capture(response: &FetchedResponse) -> CachedResponse {
  CachedResponse {
    status: response.status,
    content_type: response.content_type.clone(),
    body: response.body.clone(),
    captured_at: Utc::now(),
  }
}

/// An API entry is servable while strictly younger than the TTL.
fn is_fresh(captured_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
  now - captured_at < ttl
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gateway::fetcher::ReqwestFetcher;
  use crate::gateway::store::SqliteStore;
  use wiremock::matchers::{method as http_method, path as http_path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  /// Base URL nothing listens on; connections are refused immediately.
  const DEAD_BASE: &str = "http://127.0.0.1:1/";

  fn cached_at(body: &[u8], captured_at: DateTime<Utc>) -> CachedResponse {
    CachedResponse {
      status: 200,
      content_type: Some("application/json".to_string()),
      body: body.to_vec(),
      captured_at,
    }
  }

  fn gateway_over(store: Arc<SqliteStore>, base: &str) -> CacheGateway {
    let gateway = CacheGateway::new(
      store,
      Arc::new(ReqwestFetcher::new().unwrap()),
      Url::parse(base).unwrap(),
    );
    gateway.activate().unwrap();
    gateway
  }

  #[test]
  fn test_ttl_boundary_is_strict() {
    let ttl = Duration::milliseconds(API_TTL_MS);
    let now = Utc::now();
    assert!(is_fresh(now - Duration::milliseconds(299_999), now, ttl));
    assert!(!is_fresh(now - Duration::milliseconds(300_000), now, ttl));
    assert!(!is_fresh(now - Duration::milliseconds(300_001), now, ttl));
  }

  #[test]
  fn test_synthetic_error_body_shape() {
    let response = GatewayResponse::unavailable();
    assert_eq!(response.status, 503);
    assert_eq!(response.source, ResponseSource::Synthetic);

    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"], "Network unavailable");
    assert!(body["message"].as_str().unwrap().contains("unavailable"));
  }

  #[test]
  fn test_offline_document_is_html() {
    let response = GatewayResponse::offline_document();
    assert_eq!(response.status, 200);
    assert_eq!(response.content_type.as_deref(), Some("text/html"));
    assert_eq!(response.source, ResponseSource::Offline);
  }

  #[tokio::test]
  async fn test_cache_first_serves_cached_entry_when_network_dead() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let url = format!("{}css/responsive.css", DEAD_BASE);
    store
      .put(STATIC_PARTITION, &url, &cached_at(b"body {}", Utc::now()))
      .unwrap();

    let gateway = gateway_over(Arc::clone(&store), DEAD_BASE);
    let response = gateway
      .handle_fetch(&GatewayRequest::get(Url::parse(&url).unwrap()))
      .await
      .unwrap();

    assert_eq!(response.source, ResponseSource::Cache);
    assert_eq!(response.body, b"body {}");
  }

  #[tokio::test]
  async fn test_static_miss_with_dead_network_propagates_failure() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gateway = gateway_over(store, DEAD_BASE);

    let url = Url::parse(&format!("{}js/app.js", DEAD_BASE)).unwrap();
    let result = gateway.handle_fetch(&GatewayRequest::get(url)).await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_navigation_failure_falls_back_to_offline_page() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let offline_url = format!("{}offline.html", DEAD_BASE);
    store
      .put(PAGE_PARTITION, &offline_url, &cached_at(b"<html>offline</html>", Utc::now()))
      .unwrap();

    let gateway = gateway_over(store, DEAD_BASE);
    let url = Url::parse(&format!("{}workspace", DEAD_BASE)).unwrap();
    let response = gateway
      .handle_fetch(&GatewayRequest::navigate(url))
      .await
      .unwrap();

    assert_eq!(response.source, ResponseSource::Offline);
    assert_eq!(response.body, b"<html>offline</html>");
  }

  #[tokio::test]
  async fn test_navigation_failure_without_cache_serves_builtin_document() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gateway = gateway_over(store, DEAD_BASE);

    let url = Url::parse(&format!("{}history", DEAD_BASE)).unwrap();
    let response = gateway
      .handle_fetch(&GatewayRequest::navigate(url))
      .await
      .unwrap();

    assert_eq!(response.source, ResponseSource::Offline);
    assert!(String::from_utf8_lossy(&response.body).contains("Offline"));
  }

  #[tokio::test]
  async fn test_background_revalidation_refreshes_cached_entry() {
    let server = MockServer::start().await;
    Mock::given(http_method("GET"))
      .and(http_path("/css/responsive.css"))
      .respond_with(ResponseTemplate::new(200).set_body_raw("fresh", "text/css"))
      .mount(&server)
      .await;

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let url = format!("{}/css/responsive.css", server.uri());
    store
      .put(STATIC_PARTITION, &url, &cached_at(b"stale", Utc::now()))
      .unwrap();

    let gateway = gateway_over(Arc::clone(&store), &server.uri());
    let response = gateway
      .handle_fetch(&GatewayRequest::get(Url::parse(&url).unwrap()))
      .await
      .unwrap();

    // Stale-while-revalidate: the stale body is returned immediately...
    assert_eq!(response.body, b"stale");
    assert_eq!(response.source, ResponseSource::Cache);

    // ...and the cache entry is refreshed shortly after.
    for _ in 0..100 {
      let entry = store.get(STATIC_PARTITION, &url).unwrap().unwrap();
      if entry.body == b"fresh" {
        return;
      }
      tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("background revalidation never refreshed the entry");
  }

  #[tokio::test]
  async fn test_api_network_first_stores_capture_and_returns_live_body() {
    let server = MockServer::start().await;
    Mock::given(http_method("GET"))
      .and(http_path("/api/v1/models"))
      .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"live":true}"#, "application/json"))
      .mount(&server)
      .await;

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let url = format!("{}/api/v1/models", server.uri());
    let old = Utc::now() - Duration::minutes(10);
    store.put(API_PARTITION, &url, &cached_at(b"cached", old)).unwrap();

    let gateway = gateway_over(Arc::clone(&store), &server.uri());
    let response = gateway
      .handle_fetch(&GatewayRequest::get(Url::parse(&url).unwrap()))
      .await
      .unwrap();

    // Live body wins over the previously cached one.
    assert_eq!(response.source, ResponseSource::Network);
    assert_eq!(response.body, br#"{"live":true}"#);

    // The stored copy carries a fresh capture timestamp.
    let entry = store.get(API_PARTITION, &url).unwrap().unwrap();
    assert_eq!(entry.body, br#"{"live":true}"#);
    assert!(entry.captured_at > old);
  }

  #[tokio::test]
  async fn test_api_fallback_serves_entry_younger_than_ttl() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let url = format!("{}api/v1/models/history", DEAD_BASE);
    let two_minutes_ago = Utc::now() - Duration::minutes(2);
    store
      .put(API_PARTITION, &url, &cached_at(br#"{"items":[]}"#, two_minutes_ago))
      .unwrap();

    let gateway = gateway_over(Arc::clone(&store), DEAD_BASE);
    let response = gateway
      .handle_fetch(&GatewayRequest::get(Url::parse(&url).unwrap()))
      .await
      .unwrap();

    assert_eq!(response.source, ResponseSource::Cache);
    assert_eq!(response.body, br#"{"items":[]}"#);
  }

  #[tokio::test]
  async fn test_api_fallback_evicts_expired_entry_and_synthesizes_503() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let url = format!("{}api/v1/models/history", DEAD_BASE);
    let six_minutes_ago = Utc::now() - Duration::minutes(6);
    store
      .put(API_PARTITION, &url, &cached_at(br#"{"items":[]}"#, six_minutes_ago))
      .unwrap();

    let gateway = gateway_over(Arc::clone(&store), DEAD_BASE);
    let response = gateway
      .handle_fetch(&GatewayRequest::get(Url::parse(&url).unwrap()))
      .await
      .unwrap();

    assert_eq!(response.status, 503);
    assert_eq!(response.source, ResponseSource::Synthetic);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"], "Network unavailable");

    // Expired entries are deleted, not kept around.
    assert!(store.get(API_PARTITION, &url).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_non_get_passes_through_uncached() {
    let server = MockServer::start().await;
    Mock::given(http_method("POST"))
      .and(http_path("/api/v1/ai3d/generate/text"))
      .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"code":200}"#, "application/json"))
      .mount(&server)
      .await;

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gateway = gateway_over(Arc::clone(&store), &server.uri());

    let url = Url::parse(&format!("{}/api/v1/ai3d/generate/text", server.uri())).unwrap();
    let response = gateway
      .handle_fetch(&GatewayRequest::new(Method::POST, url))
      .await
      .unwrap();

    assert_eq!(response.source, ResponseSource::Network);
    assert!(store.urls(API_PARTITION).unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_unclassified_get_is_never_cached() {
    let server = MockServer::start().await;
    Mock::given(http_method("GET"))
      .and(http_path("/metrics"))
      .respond_with(ResponseTemplate::new(200).set_body_raw("ok", "text/plain"))
      .mount(&server)
      .await;

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gateway = gateway_over(Arc::clone(&store), &server.uri());

    let url = Url::parse(&format!("{}/metrics", server.uri())).unwrap();
    let response = gateway.handle_fetch(&GatewayRequest::get(url)).await.unwrap();

    assert_eq!(response.source, ResponseSource::Network);
    assert!(store.partitions().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_activate_purges_partitions_outside_expected_set() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let now = Utc::now();
    store.put("m3d-static-v0", "http://host/a.css", &cached_at(b"old", now)).unwrap();
    store.put(STATIC_PARTITION, "http://host/b.css", &cached_at(b"new", now)).unwrap();

    let gateway = CacheGateway::new(
      Arc::clone(&store) as Arc<dyn CacheStore>,
      Arc::new(ReqwestFetcher::new().unwrap()),
      Url::parse(DEAD_BASE).unwrap(),
    );
    assert!(!gateway.is_active());
    gateway.activate().unwrap();
    assert!(gateway.is_active());

    assert_eq!(store.partitions().unwrap(), vec![STATIC_PARTITION.to_string()]);
  }

  #[tokio::test]
  async fn test_install_populates_pages_and_static_partitions() {
    let server = MockServer::start().await;
    for (route, body, content_type) in [
      ("/", "<html>home</html>", "text/html"),
      ("/css/responsive.css", "body {}", "text/css"),
    ] {
      Mock::given(http_method("GET"))
        .and(http_path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, content_type))
        .mount(&server)
        .await;
    }

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gateway = gateway_over(Arc::clone(&store), &server.uri())
      .with_manifest(vec!["/".to_string(), "/css/responsive.css".to_string()]);

    gateway.install().await.unwrap();

    assert_eq!(store.urls(PAGE_PARTITION).unwrap().len(), 1);
    assert_eq!(store.urls(STATIC_PARTITION).unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let server = MockServer::start().await;
    Mock::given(http_method("GET"))
      .and(http_path("/css/good.css"))
      .respond_with(ResponseTemplate::new(200).set_body_raw("ok", "text/css"))
      .mount(&server)
      .await;
    Mock::given(http_method("GET"))
      .and(http_path("/css/broken.css"))
      .respond_with(ResponseTemplate::new(500))
      .mount(&server)
      .await;

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gateway = gateway_over(Arc::clone(&store), &server.uri()).with_manifest(vec![
      "/css/good.css".to_string(),
      "/css/broken.css".to_string(),
    ]);

    // A single unreachable asset fails the install and stores nothing.
    assert!(gateway.install().await.is_err());
    assert!(store.urls(STATIC_PARTITION).unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_clear_cache_command_is_idempotent() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
      .put(API_PARTITION, "http://host/api/v1/a", &cached_at(b"x", Utc::now()))
      .unwrap();

    let gateway = gateway_over(Arc::clone(&store), DEAD_BASE);
    gateway.handle_message(GatewayCommand::ClearCache).await.unwrap();
    gateway.handle_message(GatewayCommand::ClearCache).await.unwrap();

    assert!(store.partitions().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_refresh_static_command_repopulates_manifest() {
    let server = MockServer::start().await;
    Mock::given(http_method("GET"))
      .and(http_path("/css/responsive.css"))
      .respond_with(ResponseTemplate::new(200).set_body_raw("body {}", "text/css"))
      .mount(&server)
      .await;

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gateway = gateway_over(Arc::clone(&store), &server.uri())
      .with_manifest(vec!["/css/responsive.css".to_string()]);

    gateway.handle_message(GatewayCommand::RefreshStatic).await.unwrap();
    assert!(!gateway.needs_install().unwrap());

    gateway.handle_message(GatewayCommand::ClearCache).await.unwrap();
    gateway.handle_message(GatewayCommand::RefreshStatic).await.unwrap();
    assert_eq!(store.urls(STATIC_PARTITION).unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_sweep_evicts_only_expired_api_entries() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
      .put(
        API_PARTITION,
        "http://host/api/v1/old",
        &cached_at(b"old", Utc::now() - Duration::minutes(6)),
      )
      .unwrap();
    store
      .put(
        API_PARTITION,
        "http://host/api/v1/fresh",
        &cached_at(b"fresh", Utc::now() - Duration::seconds(10)),
      )
      .unwrap();

    let gateway = gateway_over(Arc::clone(&store), DEAD_BASE);
    let evicted = gateway.sweep().unwrap();

    assert_eq!(evicted, 1);
    assert!(store.get(API_PARTITION, "http://host/api/v1/old").unwrap().is_none());
    assert!(store.get(API_PARTITION, "http://host/api/v1/fresh").unwrap().is_some());
  }

  #[tokio::test]
  async fn test_inactive_gateway_passes_api_reads_through() {
    let server = MockServer::start().await;
    Mock::given(http_method("GET"))
      .and(http_path("/api/v1/models"))
      .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
      .mount(&server)
      .await;

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gateway = CacheGateway::new(
      Arc::clone(&store) as Arc<dyn CacheStore>,
      Arc::new(ReqwestFetcher::new().unwrap()),
      Url::parse(&server.uri()).unwrap(),
    );

    let url = Url::parse(&format!("{}/api/v1/models", server.uri())).unwrap();
    let response = gateway.handle_fetch(&GatewayRequest::get(url)).await.unwrap();

    assert_eq!(response.source, ResponseSource::Network);
    assert!(store.urls(API_PARTITION).unwrap().is_empty());
  }
}
