//! Shared registry of active transfer sessions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::models::session::TransferOutcome;
use crate::{AppError, Result};

/// Shared handle to one session's management-socket write half.
///
/// The process supervisor installs the write half on accept and clears it
/// when the channel closes, so the slot is populated strictly while the
/// control socket is open. Command fan-out writes through it from other
/// tasks.
#[derive(Clone, Default)]
pub struct ControlChannel {
    inner: Arc<Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>>,
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel").finish_non_exhaustive()
    }
}

impl ControlChannel {
    /// Create an empty, unconnected channel slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the connected write half.
    pub async fn install(&self, writer: impl AsyncWrite + Send + Unpin + 'static) {
        *self.inner.lock().await = Some(Box::new(writer));
    }

    /// Drop the write half, marking the channel closed.
    pub async fn clear(&self) {
        self.inner.lock().await.take();
    }

    /// Whether a write half is currently installed.
    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Write raw bytes to the management socket.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when no channel is connected and
    /// `AppError::Io` when the write fails.
    pub async fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(AppError::NotFound(
                "session has no connected management channel".into(),
            ));
        };
        writer
            .write_all(bytes)
            .await
            .map_err(|err| AppError::Io(format!("management channel write failed: {err}")))?;
        writer
            .flush()
            .await
            .map_err(|err| AppError::Io(format!("management channel flush failed: {err}")))
    }
}

/// One active session tracked by the registry.
pub struct SessionHandle {
    /// Caller-visible job id the session belongs to.
    pub job_id: String,
    /// 1-based index within the job's fan-out.
    pub session_index: u32,
    /// Shared slot holding the management-socket write half.
    pub control: ControlChannel,
    /// Task driving the session to its outcome.
    pub task: JoinHandle<TransferOutcome>,
}

/// Job-id-keyed collection of active sessions.
///
/// Guarded by a single mutex; entries leave the registry only by being
/// drained for join, so no dangling task handles survive a completed wait.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<HashMap<String, Vec<SessionHandle>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly spawned session under its job id.
    pub async fn insert(&self, handle: SessionHandle) {
        self.inner
            .lock()
            .await
            .entry(handle.job_id.clone())
            .or_default()
            .push(handle);
    }

    /// Control channels for one job, or for every active session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when an explicit job id has no active
    /// sessions.
    pub async fn controls(&self, job_id: Option<&str>) -> Result<Vec<ControlChannel>> {
        let guard = self.inner.lock().await;
        match job_id {
            Some(id) => guard
                .get(id)
                .map(|handles| handles.iter().map(|h| h.control.clone()).collect())
                .ok_or_else(|| AppError::NotFound(format!("no active sessions for job {id}"))),
            None => Ok(guard
                .values()
                .flatten()
                .map(|h| h.control.clone())
                .collect()),
        }
    }

    /// Remove and return every tracked session, ordered by job id and
    /// session index.
    pub async fn drain(&self) -> Vec<SessionHandle> {
        let mut guard = self.inner.lock().await;
        let mut handles: Vec<SessionHandle> = guard.drain().flat_map(|(_, v)| v).collect();
        handles.sort_by(|a, b| {
            a.job_id
                .cmp(&b.job_id)
                .then(a.session_index.cmp(&b.session_index))
        });
        handles
    }

    /// Whether any session is currently tracked.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Number of tracked sessions across all jobs.
    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.values().map(Vec::len).sum()
    }
}
