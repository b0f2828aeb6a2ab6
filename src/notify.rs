//! Transfer lifecycle notifications.
//!
//! Decoded management events are mapped onto a small closed notification set
//! and delivered to the registered listener as messages over a tokio
//! [`mpsc`] channel; sessions never invoke a shared listener object
//! directly from their own tasks.

use tokio::sync::mpsc;
use tracing::debug;

use crate::mgmt::event::{Event, EventType};

/// Closed lifecycle notification set delivered to the progress listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferNotification {
    /// The request was accepted and sessions are about to spawn.
    SessionsStarting {
        /// Caller-visible job id.
        job_id: String,
    },
    /// One session's worker announced itself.
    SessionStart {
        /// Caller-visible job id.
        job_id: String,
        /// 1-based session index within the job.
        session_index: u32,
    },
    /// The expected byte count for one session became known.
    SessionSizeKnown {
        /// Caller-visible job id.
        job_id: String,
        /// 1-based session index within the job.
        session_index: u32,
        /// Expected bytes for this session.
        bytes_expected: u64,
    },
    /// Cumulative progress for one session.
    TransferProgress {
        /// Caller-visible job id.
        job_id: String,
        /// 1-based session index within the job.
        session_index: u32,
        /// Bytes transferred so far, starting offset included.
        bytes_transferred: u64,
    },
    /// One session reached its terminal event.
    SessionEnd {
        /// Caller-visible job id.
        job_id: String,
        /// 1-based session index within the job.
        session_index: u32,
    },
    /// All sessions of the job have been joined.
    End {
        /// Caller-visible job id.
        job_id: String,
    },
}

/// Per-session state machine mapping events onto notifications.
#[derive(Debug)]
pub struct ProgressNotifier {
    tx: Option<mpsc::Sender<TransferNotification>>,
    job_id: String,
    session_index: u32,
    size_sent: bool,
    last_progress: Option<u64>,
}

impl ProgressNotifier {
    /// Build a notifier for one session. A `None` sender disables delivery
    /// while keeping the state machine exercised.
    #[must_use]
    pub fn new(
        tx: Option<mpsc::Sender<TransferNotification>>,
        job_id: String,
        session_index: u32,
    ) -> Self {
        Self {
            tx,
            job_id,
            session_index,
            size_sent: false,
            last_progress: None,
        }
    }

    /// Observe one decoded event and emit the notifications it implies.
    pub async fn observe(&mut self, event: &Event) {
        match event.event_type() {
            Some(EventType::Init) => {
                self.size_sent = false;
                self.last_progress = None;
                self.send(TransferNotification::SessionStart {
                    job_id: self.job_id.clone(),
                    session_index: self.session_index,
                })
                .await;
            }
            Some(EventType::Notification) => {
                // First reported expected size wins, once per session.
                if !self.size_sent {
                    if let Some(bytes_expected) = event.u64_field("PreTransferBytes") {
                        self.size_sent = true;
                        self.send(TransferNotification::SessionSizeKnown {
                            job_id: self.job_id.clone(),
                            session_index: self.session_index,
                            bytes_expected,
                        })
                        .await;
                    }
                }
            }
            Some(EventType::Stats) => {
                if let Some(bytes) = cumulative_bytes(event) {
                    self.last_progress = Some(bytes);
                    self.send(TransferNotification::TransferProgress {
                        job_id: self.job_id.clone(),
                        session_index: self.session_index,
                        bytes_transferred: bytes,
                    })
                    .await;
                }
            }
            Some(EventType::Done | EventType::Error) => {
                self.finalize(event).await;
            }
            Some(_) => {
                // Recognized but carries no progress meaning.
            }
            None => {
                debug!(
                    job_id = %self.job_id,
                    session_index = self.session_index,
                    event_type = event.get("Type").unwrap_or_default(),
                    "ignoring event with unrecognized type"
                );
            }
        }
    }

    /// Emit the final size (if never sent) and final progress (if changed),
    /// then the session-end notification.
    async fn finalize(&mut self, event: &Event) {
        let final_bytes = cumulative_bytes(event).or(self.last_progress);

        if !self.size_sent {
            self.size_sent = true;
            self.send(TransferNotification::SessionSizeKnown {
                job_id: self.job_id.clone(),
                session_index: self.session_index,
                bytes_expected: final_bytes.unwrap_or(0),
            })
            .await;
        }

        if let Some(bytes) = final_bytes {
            if self.last_progress != Some(bytes) {
                self.last_progress = Some(bytes);
                self.send(TransferNotification::TransferProgress {
                    job_id: self.job_id.clone(),
                    session_index: self.session_index,
                    bytes_transferred: bytes,
                })
                .await;
            }
        }

        self.send(TransferNotification::SessionEnd {
            job_id: self.job_id.clone(),
            session_index: self.session_index,
        })
        .await;
    }

    async fn send(&self, notification: TransferNotification) {
        if let Some(tx) = &self.tx {
            if tx.send(notification).await.is_err() {
                debug!(
                    job_id = %self.job_id,
                    session_index = self.session_index,
                    "progress listener dropped, discarding notification"
                );
            }
        }
    }
}

/// Cumulative byte count of a progress-bearing event: transferred bytes plus
/// the starting offset of a resumed file.
fn cumulative_bytes(event: &Event) -> Option<u64> {
    let transferred = event.u64_field("TransferBytes")?;
    Some(transferred + event.u64_field("StartByte").unwrap_or(0))
}
