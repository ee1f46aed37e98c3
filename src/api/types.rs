use thiserror::Error;

/// Normalized lifecycle state of a generation job.
///
/// The service speaks two status vocabularies depending on endpoint
/// version: WAIT/RUN/DONE/FAIL from the generation backend and
/// PENDING/PROCESSING/COMPLETED/FAILED from the history endpoints.
/// Both normalize to this enum; anything else is an unrecognized status
/// and is handled by the caller's fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
  Pending,
  Processing,
  Completed,
  Failed,
}

impl JobState {
  /// Parse a remote status string from either vocabulary.
  pub fn parse(raw: &str) -> Option<Self> {
    match raw {
      "WAIT" | "PENDING" => Some(Self::Pending),
      "RUN" | "PROCESSING" => Some(Self::Processing),
      "DONE" | "COMPLETED" => Some(Self::Completed),
      "FAIL" | "FAILED" => Some(Self::Failed),
      _ => None,
    }
  }

  /// Fixed progress percentage displayed for this state.
  pub fn progress(self) -> u8 {
    match self {
      Self::Pending => 10,
      Self::Processing => 50,
      Self::Completed => 100,
      Self::Failed => 0,
    }
  }

  /// Fixed display message for this state.
  pub fn message(self) -> &'static str {
    match self {
      Self::Pending => "Job created, waiting to be processed...",
      Self::Processing => "Generating 3D model...",
      Self::Completed => "Model generation complete",
      Self::Failed => "Generation failed, please retry",
    }
  }

  /// Terminal states end the poll loop.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Failed)
  }

  /// Normalized wire name, as used by history filters.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "PENDING",
      Self::Processing => "PROCESSING",
      Self::Completed => "COMPLETED",
      Self::Failed => "FAILED",
    }
  }
}

impl std::fmt::Display for JobState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for JobState {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(&s.to_uppercase())
      .ok_or_else(|| format!("unknown job state '{}' (expected pending, processing, completed or failed)", s))
  }
}

/// A job accepted by the service.
#[derive(Debug, Clone)]
pub struct SubmittedJob {
  pub job_id: String,
  pub request_id: Option<String>,
  /// Server-side estimate in seconds, when provided.
  pub estimated_time: Option<u64>,
}

/// One generated output file attached to a completed job.
#[derive(Debug, Clone)]
pub struct ResultFile {
  pub format: Option<String>,
  pub file_size: Option<u64>,
  pub model_url: Option<String>,
  pub preview_image_url: Option<String>,
}

/// Snapshot of a job as reported by the status endpoint.
#[derive(Debug, Clone)]
pub struct JobStatus {
  /// Status string exactly as the server sent it.
  pub raw_status: String,
  /// Normalized state; None for unrecognized statuses.
  pub state: Option<JobState>,
  /// Server-supplied progress, used only for unrecognized statuses.
  pub server_progress: Option<u8>,
  pub error_message: Option<String>,
  pub result_files: Vec<ResultFile>,
}

impl JobStatus {
  /// Progress percentage: fixed per-state policy; unrecognized statuses
  /// carry the server-supplied value or default to 0.
  pub fn progress(&self) -> u8 {
    match self.state {
      Some(state) => state.progress(),
      None => self.server_progress.unwrap_or(0),
    }
  }

  /// Display message: per-state table, then the server error message,
  /// then a generic processing message.
  pub fn message(&self) -> String {
    match self.state {
      Some(state) => state.message().to_string(),
      None => self
        .error_message
        .clone()
        .unwrap_or_else(|| "Processing...".to_string()),
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.state.is_some_and(JobState::is_terminal)
  }

  /// First result file, the one shown in the result panel.
  pub fn first_result(&self) -> Option<&ResultFile> {
    self.result_files.first()
  }
}

/// One entry in the job history listing.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
  pub task_id: String,
  pub raw_status: String,
  pub state: Option<JobState>,
  pub prompt: Option<String>,
  pub created_at: Option<String>,
  pub completed_at: Option<String>,
  pub preview_url: Option<String>,
  pub model_url: Option<String>,
}

/// One page of the job history listing.
#[derive(Debug, Clone)]
pub struct HistoryPage {
  pub items: Vec<HistoryEntry>,
  /// 1-based page number as reported by the server.
  pub page: u32,
  pub total_pages: u32,
  pub total: u64,
}

/// Input rejected before any network call is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("prompt must not be empty")]
  EmptyPrompt,
  #[error("prompt must not exceed {max} characters (got {len})")]
  PromptTooLong { len: usize, max: usize },
  #[error("no image data provided")]
  EmptyImage,
  #[error("image must not exceed {max} bytes (got {len})")]
  ImageTooLarge { len: usize, max: usize },
}
