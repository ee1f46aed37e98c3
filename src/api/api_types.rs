//! Serde-deserializable types matching the generation service's REST API.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::Deserialize;

use super::types::{HistoryEntry, HistoryPage, JobState, JobStatus, ResultFile, SubmittedJob};

/// Response envelope shared by every JSON endpoint: `{code, message, data}`.
/// `code == 200` signals success regardless of the HTTP status.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
  #[serde(default)]
  pub code: i64,
  pub message: Option<String>,
  pub data: Option<T>,
}

// ============================================================================
// Submit endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSubmitData {
  /// Newer endpoints return `jobId`, older ones `taskId`.
  #[serde(rename = "jobId")]
  pub job_id: Option<String>,
  #[serde(rename = "taskId")]
  pub task_id: Option<String>,
  #[serde(rename = "requestId")]
  pub request_id: Option<String>,
  #[serde(rename = "estimatedTime")]
  pub estimated_time: Option<u64>,
}

impl ApiSubmitData {
  pub fn into_submitted(self) -> Option<SubmittedJob> {
    let job_id = self.job_id.or(self.task_id)?;
    Some(SubmittedJob {
      job_id,
      request_id: self.request_id,
      estimated_time: self.estimated_time,
    })
  }
}

// ============================================================================
// Status endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiResultFile {
  pub format: Option<String>,
  #[serde(rename = "fileSize")]
  pub file_size: Option<u64>,
  #[serde(rename = "modelUrl")]
  pub model_url: Option<String>,
  #[serde(rename = "previewImageUrl")]
  pub preview_image_url: Option<String>,
}

impl From<ApiResultFile> for ResultFile {
  fn from(file: ApiResultFile) -> Self {
    ResultFile {
      format: file.format,
      file_size: file.file_size,
      model_url: file.model_url,
      preview_image_url: file.preview_image_url,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiStatusData {
  #[serde(default)]
  pub status: String,
  pub progress: Option<u8>,
  #[serde(rename = "errorMessage")]
  pub error_message: Option<String>,
  #[serde(rename = "resultFile3Ds", default)]
  pub result_file_3ds: Vec<ApiResultFile>,
}

impl ApiStatusData {
  pub fn into_status(self) -> JobStatus {
    let state = JobState::parse(&self.status);
    JobStatus {
      raw_status: self.status,
      state,
      server_progress: self.progress,
      error_message: self.error_message,
      result_files: self.result_file_3ds.into_iter().map(Into::into).collect(),
    }
  }
}

// ============================================================================
// History endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiHistoryItem {
  #[serde(rename = "taskId")]
  pub task_id: String,
  #[serde(default)]
  pub status: String,
  pub prompt: Option<String>,
  #[serde(rename = "createdAt")]
  pub created_at: Option<String>,
  #[serde(rename = "completedAt")]
  pub completed_at: Option<String>,
  #[serde(rename = "previewUrl")]
  pub preview_url: Option<String>,
  #[serde(rename = "modelUrl")]
  pub model_url: Option<String>,
}

impl From<ApiHistoryItem> for HistoryEntry {
  fn from(item: ApiHistoryItem) -> Self {
    let state = JobState::parse(&item.status);
    HistoryEntry {
      task_id: item.task_id,
      raw_status: item.status,
      state,
      prompt: item.prompt,
      created_at: item.created_at,
      completed_at: item.completed_at,
      preview_url: item.preview_url,
      model_url: item.model_url,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiHistoryData {
  #[serde(default)]
  pub items: Vec<ApiHistoryItem>,
  #[serde(default)]
  pub page: u32,
  #[serde(rename = "totalPages", default)]
  pub total_pages: u32,
  #[serde(default)]
  pub total: u64,
}

impl ApiHistoryData {
  pub fn into_page(self) -> HistoryPage {
    HistoryPage {
      items: self.items.into_iter().map(Into::into).collect(),
      page: self.page,
      total_pages: self.total_pages,
      total: self.total,
    }
  }
}
