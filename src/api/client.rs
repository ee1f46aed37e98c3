use base64::Engine;
use color_eyre::{eyre::eyre, Result};
use reqwest::multipart;
use std::path::Path;
use url::Url;

use crate::config::Config;
use crate::gateway::{CacheGateway, GatewayRequest, GatewayResponse};

use super::api_types::{ApiEnvelope, ApiHistoryData, ApiStatusData, ApiSubmitData};
use super::types::{HistoryPage, JobState, JobStatus, SubmittedJob, ValidationError};

/// Longest accepted text prompt, in characters.
pub const MAX_PROMPT_CHARS: usize = 1024;

/// Largest accepted source image, in bytes (before base64 encoding).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Client for the model generation service.
///
/// Idempotent reads are routed through the cache gateway so they keep
/// working offline within the TTL; submissions are POSTs and go straight
/// to the network, never intercepted.
#[derive(Clone)]
pub struct Model3dClient {
  http: reqwest::Client,
  gateway: CacheGateway,
  base: Url,
}

impl Model3dClient {
  pub fn new(config: &Config, gateway: CacheGateway) -> Result<Self> {
    let base = Url::parse(&config.server.url)
      .map_err(|e| eyre!("Invalid server URL {}: {}", config.server.url, e))?;

    let http = reqwest::Client::builder()
      .connect_timeout(std::time::Duration::from_secs(10))
      .timeout(std::time::Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { http, gateway, base })
  }

  pub fn gateway(&self) -> &CacheGateway {
    &self.gateway
  }

  /// Submit a text-to-3D job.
  ///
  /// The prompt is validated before any network call: it must be
  /// non-empty and at most [`MAX_PROMPT_CHARS`] characters.
  pub async fn submit_text(&self, prompt: &str, format: Option<&str>) -> Result<SubmittedJob> {
    if prompt.trim().is_empty() {
      return Err(ValidationError::EmptyPrompt.into());
    }
    let len = prompt.chars().count();
    if len > MAX_PROMPT_CHARS {
      return Err(ValidationError::PromptTooLong { len, max: MAX_PROMPT_CHARS }.into());
    }

    let mut form = vec![("prompt", prompt.to_string())];
    if let Some(format) = format {
      // OBJ is the server default and is omitted from the request.
      if !format.eq_ignore_ascii_case("OBJ") {
        form.push(("resultFormat", format.to_string()));
      }
    }

    let url = self.endpoint("/api/v1/ai3d/generate/text")?;
    let response = self
      .http
      .post(url)
      .form(&form)
      .send()
      .await
      .map_err(|e| eyre!("Failed to submit text job: {}", e))?;

    let envelope: ApiEnvelope<ApiSubmitData> = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse submit response: {}", e))?;

    unwrap_envelope(envelope)?
      .into_submitted()
      .ok_or_else(|| eyre!("Submit response carried no job id"))
  }

  /// Submit an image-to-3D job from raw image bytes.
  ///
  /// The image is validated before any network call, then base64-encoded
  /// into the multipart payload the service expects.
  pub async fn submit_image(
    &self,
    image: &[u8],
    format: Option<&str>,
    enable_pbr: bool,
  ) -> Result<SubmittedJob> {
    if image.is_empty() {
      return Err(ValidationError::EmptyImage.into());
    }
    if image.len() > MAX_IMAGE_BYTES {
      return Err(ValidationError::ImageTooLarge { len: image.len(), max: MAX_IMAGE_BYTES }.into());
    }

    let encoded = base64::engine::general_purpose::STANDARD.encode(image);
    let mut form = multipart::Form::new().text("imageBase64", encoded);
    if let Some(format) = format {
      form = form.text("format", format.to_string());
    }
    if enable_pbr {
      form = form.text("enablePBR", "true");
    }

    let url = self.endpoint("/api/v1/ai3d/submit/image-base64")?;
    let response = self
      .http
      .post(url)
      .multipart(form)
      .send()
      .await
      .map_err(|e| eyre!("Failed to submit image job: {}", e))?;

    let envelope: ApiEnvelope<ApiSubmitData> = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse submit response: {}", e))?;

    unwrap_envelope(envelope)?
      .into_submitted()
      .ok_or_else(|| eyre!("Submit response carried no job id"))
  }

  /// Query the status of a submitted job.
  pub async fn query_status(&self, job_id: &str) -> Result<JobStatus> {
    let url = self.endpoint(&format!("/api/v1/ai3d/query/{}", job_id))?;
    let response = self.fetch_through_gateway(url).await?;
    ensure_ok(&response)?;

    let envelope: ApiEnvelope<ApiStatusData> = parse_json(&response)?;
    Ok(unwrap_envelope(envelope)?.into_status())
  }

  /// List past jobs, newest first. `page` is 0-based on the wire.
  pub async fn history(
    &self,
    page: u32,
    size: u32,
    status: Option<JobState>,
  ) -> Result<HistoryPage> {
    let mut url = self.endpoint("/api/v1/models/history")?;
    {
      let mut query = url.query_pairs_mut();
      query.append_pair("page", &page.to_string());
      query.append_pair("size", &size.to_string());
      query.append_pair("sortBy", "createTime");
      query.append_pair("sortDir", "desc");
      if let Some(status) = status {
        query.append_pair("status", status.as_str());
      }
    }

    let response = self.fetch_through_gateway(url).await?;
    ensure_ok(&response)?;

    let envelope: ApiEnvelope<ApiHistoryData> = parse_json(&response)?;
    Ok(unwrap_envelope(envelope)?.into_page())
  }

  /// Download the model for a job to `dest`.
  pub async fn download(&self, job_id: &str, dest: &Path) -> Result<()> {
    let url = self.endpoint(&format!("/api/v1/ai3d/download/{}", job_id))?;
    let response = self.fetch_through_gateway(url).await?;
    ensure_ok(&response)?;

    std::fs::write(dest, &response.body)
      .map_err(|e| eyre!("Failed to write {}: {}", dest.display(), e))?;
    Ok(())
  }

  async fn fetch_through_gateway(&self, url: Url) -> Result<GatewayResponse> {
    self.gateway.handle_fetch(&GatewayRequest::get(url)).await
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint {}: {}", path, e))
  }
}

/// Reject non-2xx responses, surfacing the message of the gateway's
/// synthetic error body when one is present.
fn ensure_ok(response: &GatewayResponse) -> Result<()> {
  if response.is_ok() {
    return Ok(());
  }

  let detail = serde_json::from_slice::<serde_json::Value>(&response.body)
    .ok()
    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
    .unwrap_or_default();

  Err(eyre!("Request failed with status {}: {}", response.status, detail))
}

fn parse_json<T: serde::de::DeserializeOwned>(response: &GatewayResponse) -> Result<T> {
  serde_json::from_slice(&response.body)
    .map_err(|e| eyre!("Failed to parse response body: {}", e))
}

/// Unwrap the `{code, message, data}` envelope; any code other than 200
/// is a failure carrying the server's message.
fn unwrap_envelope<T>(envelope: ApiEnvelope<T>) -> Result<T> {
  if envelope.code != 200 {
    return Err(eyre!(
      "Request failed: {}",
      envelope
        .message
        .unwrap_or_else(|| format!("server returned code {}", envelope.code))
    ));
  }
  envelope
    .data
    .ok_or_else(|| eyre!("Response envelope carried no data"))
}
