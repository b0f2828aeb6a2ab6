//! Session state and per-session outcomes.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::AppError;

/// Mutable per-task state for one worker-process invocation.
///
/// Owned by the supervising task; never shared across sessions. The
/// worker-assigned id is known only after the `INIT` event arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    /// Caller-visible job id shared by all sessions of one request.
    pub job_id: String,
    /// 1-based index within the request's fan-out.
    pub session_index: u32,
    /// Worker-assigned session id, learned from `INIT`.
    pub worker_session_id: Option<String>,
    /// Side-channel command file polled once per decoded event.
    pub command_file: Option<PathBuf>,
}

impl TransferSession {
    /// Construct the state for one session of a job.
    #[must_use]
    pub fn new(job_id: String, session_index: u32) -> Self {
        Self {
            job_id,
            session_index,
            worker_session_id: None,
            command_file: None,
        }
    }
}

/// Final result of one session, surfaced when the caller joins.
///
/// Per-session errors are captured here rather than raised across task
/// boundaries, so partial failure of a multi-session job is always
/// individually observable.
#[derive(Debug)]
pub struct TransferOutcome {
    /// Job this session belonged to.
    pub job_id: String,
    /// 1-based index within the job's fan-out.
    pub session_index: u32,
    /// Worker-assigned session id, when the worker got far enough to report it.
    pub worker_session_id: Option<String>,
    /// When the first attempt started.
    pub started_at: DateTime<Utc>,
    /// When the session reached its terminal state.
    pub finished_at: DateTime<Utc>,
    /// Terminal error; `None` means success.
    pub error: Option<AppError>,
}

impl TransferOutcome {
    /// Whether the session ended successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
