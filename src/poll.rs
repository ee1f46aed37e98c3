//! Job status polling: one session, one timer, one job.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::warn;

use crate::api::client::Model3dClient;
use crate::api::types::{JobState, JobStatus};
use crate::event::StatusEvent;

/// How often an in-flight job is queried.
pub const POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// A running poll loop bound to exactly one job.
///
/// The session owns its timer task: starting a new session replaces the
/// previous one, and stopping or dropping the session cancels the timer,
/// so a closed front-end cannot leak background queries.
pub struct PollSession {
  job_id: String,
  handle: JoinHandle<()>,
}

impl PollSession {
  /// Begin polling `job_id`, cancelling `previous` if one is live.
  pub fn start(
    client: Model3dClient,
    job_id: String,
    events: mpsc::UnboundedSender<StatusEvent>,
    previous: Option<PollSession>,
  ) -> PollSession {
    if let Some(session) = previous {
      session.stop();
    }

    let handle = tokio::spawn(poll_loop(client, job_id.clone(), events));
    PollSession { job_id, handle }
  }

  pub fn job_id(&self) -> &str {
    &self.job_id
  }

  /// Whether the timer has ended, either by `stop` or by a terminal state.
  pub fn is_finished(&self) -> bool {
    self.handle.is_finished()
  }

  /// Cancel the timer. Safe to call any number of times.
  pub fn stop(&self) {
    self.handle.abort();
  }
}

impl Drop for PollSession {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

async fn poll_loop(
  client: Model3dClient,
  job_id: String,
  events: mpsc::UnboundedSender<StatusEvent>,
) {
  let mut ticker = interval(POLL_INTERVAL);
  // A slow query must not race the next tick. Each query is awaited in
  // full and ticks that fired meanwhile are skipped, so status updates
  // apply in order.
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    ticker.tick().await;

    let status = match client.query_status(&job_id).await {
      Ok(status) => status,
      Err(err) => {
        // Logged and retried on the next tick; job state is untouched.
        warn!(job_id = %job_id, error = %err, "status query failed");
        continue;
      }
    };

    if apply_update(&job_id, &status, &events) {
      break;
    }
  }
}

/// Feed one status result into the state-update step.
///
/// Emits a progress event for the update, then a terminal event when the
/// job finished. Returns true when polling must stop.
fn apply_update(
  job_id: &str,
  status: &JobStatus,
  events: &mpsc::UnboundedSender<StatusEvent>,
) -> bool {
  let _ = events.send(StatusEvent::Progress {
    job_id: job_id.to_string(),
    state: status.state,
    progress: status.progress(),
    message: status.message(),
  });

  match status.state {
    Some(JobState::Completed) => {
      let _ = events.send(StatusEvent::Completed {
        job_id: job_id.to_string(),
        result: status.first_result().cloned(),
      });
      true
    }
    Some(JobState::Failed) => {
      let _ = events.send(StatusEvent::Failed {
        job_id: job_id.to_string(),
        message: status
          .error_message
          .clone()
          .unwrap_or_else(|| JobState::Failed.message().to_string()),
      });
      true
    }
    _ => false,
  }
}
