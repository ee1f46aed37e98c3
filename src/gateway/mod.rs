//! Offline cache gateway.
//!
//! Intercepts the client's GET traffic, classifies each request by URL,
//! and applies a per-class strategy over named cache partitions:
//! - cache-first with background revalidation for static assets and pages
//! - network-first with a TTL-bounded fallback for API reads
//! - plain passthrough for everything else
//!
//! Partitions live in a [`CacheStore`]; the gateway keeps exactly one
//! partition set live at a time and evicts expired API entries both on
//! access and on a background sweep.

mod classify;
mod fetcher;
mod layer;
mod store;

pub use classify::{classify, RequestClass};
pub use fetcher::{FetchError, FetchedResponse, Fetcher, ReqwestFetcher};
pub use layer::{
  CacheGateway, GatewayCommand, GatewayRequest, GatewayResponse, ResponseSource, API_PARTITION,
  PAGE_PARTITION, STATIC_PARTITION, SWEEP_INTERVAL,
};
pub use store::{CacheStore, CachedResponse, NoopStore, SqliteStore};
