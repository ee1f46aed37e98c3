use crate::api::types::{JobState, ResultFile};

/// Events delivered from the poll session to the front-end.
#[derive(Debug, Clone)]
pub enum StatusEvent {
  /// A status update for a job that has not finished yet.
  Progress {
    job_id: String,
    /// Normalized state; None for unrecognized remote statuses.
    state: Option<JobState>,
    progress: u8,
    message: String,
  },
  /// The job finished; carries the first result file when one exists.
  Completed {
    job_id: String,
    result: Option<ResultFile>,
  },
  /// The job failed; the message is the server error when available.
  Failed { job_id: String, message: String },
}
