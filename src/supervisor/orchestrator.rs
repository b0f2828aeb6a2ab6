//! Multi-session fan-out and the local transfer agent.
//!
//! [`LocalAgent`] fans one compiled request into N supervised sessions, one
//! tokio task each, registered under the shared job id. Callers join
//! through `wait_for_transfers_completion`; per-session failures are
//! captured in the outcomes, never raised across task boundaries.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::agent::{CommandFields, TokenRefresh, TransferAgent};
use crate::compiler;
use crate::config::AgentConfig;
use crate::locator::WorkerLocator;
use crate::mgmt::codec::encode_command;
use crate::models::request::TransferRequest;
use crate::models::session::{TransferOutcome, TransferSession};
use crate::notify::{ProgressNotifier, TransferNotification};
use crate::supervisor::process::{self, WorkerInvocation};
use crate::supervisor::registry::{ControlChannel, SessionHandle, SessionRegistry};
use crate::supervisor::resume;
use crate::{AppError, Result};

/// Local transfer execution backend: one supervised worker process per
/// session on this host.
pub struct LocalAgent {
    config: Arc<AgentConfig>,
    locator: WorkerLocator,
    registry: Arc<SessionRegistry>,
    listener: Mutex<Option<mpsc::Sender<TransferNotification>>>,
}

impl LocalAgent {
    /// Build a local agent with a locator derived from the configuration.
    #[must_use]
    pub fn new(config: Arc<AgentConfig>) -> Self {
        let locator = WorkerLocator::new(config.worker.search_paths.clone());
        Self::with_locator(config, locator)
    }

    /// Build a local agent around an explicitly injected locator.
    #[must_use]
    pub fn with_locator(config: Arc<AgentConfig>, locator: WorkerLocator) -> Self {
        Self {
            config,
            locator,
            registry: Arc::new(SessionRegistry::new()),
            listener: Mutex::new(None),
        }
    }

    async fn start(
        &self,
        request: TransferRequest,
        refresher: Option<Arc<dyn TokenRefresh>>,
    ) -> Result<String> {
        let spec = compiler::compile(&request, &self.config)?;
        let executable = self.locator.locate(&spec.executable)?;
        let session_count = request.session_count();
        let listener_tx = self.listener.lock().await.clone();

        info!(job_id = %spec.job_id, session_count, "starting transfer");
        notify(
            listener_tx.as_ref(),
            TransferNotification::SessionsStarting {
                job_id: spec.job_id.clone(),
            },
        )
        .await;

        // The fan-out directive itself is never forwarded to the worker;
        // each session gets a deep-cloned spec plus its own index argument.
        for session_index in 1..=session_count {
            if session_index > 1 {
                sleep(self.config.worker.spawn_delay()).await;
            }

            let udp_port = session_udp_port(
                request.udp_port,
                self.config.multi_session.base_udp_port,
                session_index,
                session_count,
                self.config.multi_session.port_increment,
            );
            let args = session_args(&spec.args, session_index, session_count, udp_port);

            let control = ControlChannel::new();
            let invocation = WorkerInvocation {
                executable: executable.clone(),
                args,
                env: spec.env.clone(),
            };
            let task = tokio::spawn(run_session(
                Arc::clone(&self.config),
                spec.job_id.clone(),
                session_index,
                invocation,
                control.clone(),
                listener_tx.clone(),
                refresher.clone(),
            ));

            self.registry
                .insert(SessionHandle {
                    job_id: spec.job_id.clone(),
                    session_index,
                    control,
                    task,
                })
                .await;
        }

        Ok(spec.job_id)
    }

    async fn wait(&self) -> Vec<TransferOutcome> {
        let handles = self.registry.drain().await;
        let listener_tx = self.listener.lock().await.clone();
        let outcomes = join_all(handles).await;

        // One end notification per job, after every session joined.
        let mut seen: Vec<&str> = Vec::new();
        for outcome in &outcomes {
            if !seen.contains(&outcome.job_id.as_str()) {
                seen.push(outcome.job_id.as_str());
                notify(
                    listener_tx.as_ref(),
                    TransferNotification::End {
                        job_id: outcome.job_id.clone(),
                    },
                )
                .await;
            }
        }
        outcomes
    }

    async fn command(&self, command: CommandFields, job_id: Option<String>) -> Result<()> {
        let controls = self.registry.controls(job_id.as_deref()).await?;
        let frame = encode_command(&command);
        for control in controls {
            if let Err(err) = control.send(frame.as_bytes()).await {
                debug!(%err, "skipping session without a connected management channel");
            }
        }
        Ok(())
    }
}

impl TransferAgent for LocalAgent {
    fn start_transfer(
        &self,
        request: TransferRequest,
        refresher: Option<Arc<dyn TokenRefresh>>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(self.start(request, refresher))
    }

    fn wait_for_transfers_completion(
        &self,
    ) -> Pin<Box<dyn Future<Output = Vec<TransferOutcome>> + Send + '_>> {
        Box::pin(self.wait())
    }

    fn send_command(
        &self,
        command: CommandFields,
        job_id: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.command(command, job_id))
    }

    fn register_listener(
        &self,
        tx: mpsc::Sender<TransferNotification>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            *self.listener.lock().await = Some(tx);
        })
    }
}

/// Per-session argument vector: the compiled args plus the session-index
/// argument (multi-session only) and the session's UDP data port.
#[must_use]
pub fn session_args(
    compiled: &[String],
    session_index: u32,
    session_count: u32,
    udp_port: Option<u16>,
) -> Vec<String> {
    let mut args = compiled.to_vec();
    if session_count > 1 {
        args.push("-C".into());
        args.push(format!("{session_index}:{session_count}"));
    }
    if let Some(port) = udp_port {
        args.push("-O".into());
        args.push(port.to_string());
    }
    args
}

/// UDP data port for one session under the increment policy.
///
/// With fan-out and increment enabled, the base port (explicit on the
/// request, or the protocol default) advances by one per session;
/// otherwise the request's explicit port passes through unchanged.
#[must_use]
pub fn session_udp_port(
    request_port: Option<u16>,
    base_port: u16,
    session_index: u32,
    session_count: u32,
    increment: bool,
) -> Option<u16> {
    if session_count > 1 && increment {
        let base = request_port.unwrap_or(base_port);
        let offset = u16::try_from(session_index - 1).unwrap_or(u16::MAX);
        Some(base.saturating_add(offset))
    } else {
        request_port
    }
}

/// Join a set of session handles into their outcomes.
///
/// A panicked or cancelled task is converted into a non-success outcome
/// rather than propagating.
pub async fn join_all(handles: Vec<SessionHandle>) -> Vec<TransferOutcome> {
    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let SessionHandle {
            job_id,
            session_index,
            task,
            ..
        } = handle;
        match task.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                warn!(%job_id, session_index, %err, "session task did not run to completion");
                let now = Utc::now();
                outcomes.push(TransferOutcome {
                    job_id,
                    session_index,
                    worker_session_id: None,
                    started_at: now,
                    finished_at: now,
                    error: Some(AppError::Io(format!("session task failed: {err}"))),
                });
            }
        }
    }
    outcomes
}

/// Mutable state shared between the attempts of one session.
struct SessionState {
    session: TransferSession,
    invocation: WorkerInvocation,
    notifier: ProgressNotifier,
}

/// Run one session to its terminal outcome under the resume policy.
async fn run_session(
    config: Arc<AgentConfig>,
    job_id: String,
    session_index: u32,
    invocation: WorkerInvocation,
    control: ControlChannel,
    listener_tx: Option<mpsc::Sender<TransferNotification>>,
    refresher: Option<Arc<dyn TokenRefresh>>,
) -> TransferOutcome {
    let started_at = Utc::now();

    let mut session = TransferSession::new(job_id.clone(), session_index);
    if let Some(dir) = &config.worker.command_dir {
        session.command_file = Some(dir.join(format!("{job_id}.{session_index}.cmd")));
    }

    let notifier = ProgressNotifier::new(listener_tx, job_id.clone(), session_index);
    let state = Arc::new(Mutex::new(SessionState {
        session,
        invocation,
        notifier,
    }));

    let label = format!("{job_id}:{session_index}");
    let result = resume::with_resume(&config.resume, &label, |attempt| {
        let state = Arc::clone(&state);
        let config = Arc::clone(&config);
        let control = control.clone();
        let refresher = refresher.clone();
        async move {
            let mut guard = state.lock().await;
            let SessionState {
                session,
                invocation,
                notifier,
            } = &mut *guard;
            debug!(attempt, job_id = %session.job_id, "supervising attempt");
            process::supervise(
                session,
                invocation,
                &config,
                &control,
                notifier,
                refresher.as_ref(),
            )
            .await
        }
    })
    .await;

    let state = state.lock().await;
    TransferOutcome {
        job_id,
        session_index,
        worker_session_id: state.session.worker_session_id.clone(),
        started_at,
        finished_at: Utc::now(),
        error: result.err(),
    }
}

/// Deliver one notification, tolerating a dropped listener.
async fn notify(
    tx: Option<&mpsc::Sender<TransferNotification>>,
    notification: TransferNotification,
) {
    if let Some(tx) = tx {
        if tx.send(notification).await.is_err() {
            debug!("progress listener dropped, discarding notification");
        }
    }
}
