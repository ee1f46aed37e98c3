//! Network boundary of the cache gateway.
//!
//! Network trouble is a value, not an exception: strategies pick their
//! fallback path by matching on [`FetchError`] instead of intercepting
//! panics or opaque errors.

use async_trait::async_trait;
use reqwest::Method;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Error)]
pub enum FetchError {
  #[error("network unavailable: {0}")]
  Network(String),
  #[error("request timed out")]
  Timeout,
}

/// A response captured off the wire.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl FetchedResponse {
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Issues one request and resolves it to a response or a [`FetchError`].
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, method: Method, url: &Url) -> Result<FetchedResponse, FetchError>;
}

/// Fetcher backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestFetcher {
  client: reqwest::Client,
}

impl ReqwestFetcher {
  pub fn new() -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| FetchError::Network(e.to_string()))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
  async fn fetch(&self, method: Method, url: &Url) -> Result<FetchedResponse, FetchError> {
    let response = self
      .client
      .request(method, url.clone())
      .send()
      .await
      .map_err(map_reqwest_error)?;

    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|value| value.to_str().ok())
      .map(String::from);

    let body = response.bytes().await.map_err(map_reqwest_error)?.to_vec();

    Ok(FetchedResponse {
      status,
      content_type,
      body,
    })
  }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
  if err.is_timeout() {
    FetchError::Timeout
  } else {
    FetchError::Network(err.to_string())
  }
}
