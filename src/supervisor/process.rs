//! Worker process supervision.
//!
//! One supervised execution owns one worker process end to end: bind a
//! loopback management port, spawn the worker pointed at it, wait (bounded)
//! for the inbound control connection, drive the framed event loop to EOF,
//! classify the terminal event, and always run cleanup: interrupt, reap,
//! and surface an abnormal exit. Every failure normalizes into the [`AppError`]
//! family so the resume policy applies a single retryable/fatal predicate.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures_util::StreamExt;
use regex::Regex;
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::agent::TokenRefresh;
use crate::compiler::ENV_TOKEN;
use crate::config::AgentConfig;
use crate::mgmt::codec::{encode_command, MgmtCodec};
use crate::mgmt::event::{Event, EventType};
use crate::models::session::TransferSession;
use crate::notify::ProgressNotifier;
use crate::supervisor::registry::ControlChannel;
use crate::{AppError, Result};

/// Environment variables the worker inherits from this process. Everything
/// else is stripped before the compiled pairs (credentials included) are
/// injected explicitly. Secrets travel via environment, never argv.
const INHERITED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "TMPDIR",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
];

/// Grace period between the interrupt signal and a forced kill.
const INTERRUPT_GRACE: Duration = Duration::from_secs(5);

/// Worker error descriptions indicating an expired bearer token.
const CREDENTIAL_EXPIRY_PATTERN: &str = r"(?i)token\b.*\bexpired";

/// One compiled worker invocation, ready to spawn.
///
/// The environment is mutable so a credential refresh between attempts is
/// picked up by the next spawn.
#[derive(Debug, Clone)]
pub struct WorkerInvocation {
    /// Resolved worker executable.
    pub executable: PathBuf,
    /// Argument vector, management-port flag excluded (prepended here).
    pub args: Vec<String>,
    /// Environment pairs, secrets included.
    pub env: Vec<(String, String)>,
}

/// Supervise one worker execution; blocks until the worker exits.
///
/// With monitoring disabled by configuration the worker is spawned
/// fire-and-forget and this returns immediately after the spawn.
///
/// # Errors
///
/// All failure kinds normalize into [`AppError`]: `Spawn` when the process
/// cannot start, `ConnectTimeout` when no management connection arrives
/// within the bound, `Protocol` on malformed framing or a missing terminal
/// event, `Worker` for a reported `ERROR`, and `AbnormalExit` for an
/// unsuccessful exit status with no prior error.
pub async fn supervise(
    session: &mut TransferSession,
    invocation: &mut WorkerInvocation,
    config: &AgentConfig,
    control: &ControlChannel,
    notifier: &mut ProgressNotifier,
    refresher: Option<&Arc<dyn TokenRefresh>>,
) -> Result<()> {
    if !config.worker.monitor {
        let mut cmd = base_command(&invocation.executable, &invocation.args, &invocation.env);
        let child = cmd.spawn().map_err(|err| {
            AppError::Spawn(format!(
                "failed to spawn {}: {err}",
                invocation.executable.display()
            ))
        })?;
        info!(
            job_id = %session.job_id,
            session_index = session.session_index,
            pid = child.id().unwrap_or(0),
            "worker spawned unmonitored"
        );
        return Ok(());
    }

    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|err| AppError::Io(format!("failed to bind management port: {err}")))?;
    let port = listener
        .local_addr()
        .map_err(|err| AppError::Io(format!("failed to read management port: {err}")))?
        .port();

    let mut args = management_args(&invocation.executable, port);
    args.extend(invocation.args.iter().cloned());

    let mut cmd = base_command(&invocation.executable, &args, &invocation.env);
    cmd.kill_on_drop(true);
    let child = cmd.spawn().map_err(|err| {
        AppError::Spawn(format!(
            "failed to spawn {}: {err}",
            invocation.executable.display()
        ))
    })?;
    info!(
        job_id = %session.job_id,
        session_index = session.session_index,
        port,
        pid = child.id().unwrap_or(0),
        "worker spawned under management"
    );

    let result = monitor(
        session,
        &listener,
        config.worker.connect_timeout(),
        control,
        notifier,
        refresher,
        &mut invocation.env,
    )
    .await;

    // Cleanup always runs; dropping the listener releases the port.
    drop(listener);
    conclude(child, result).await
}

/// Wait for the control connection, drive the event loop, classify.
async fn monitor(
    session: &mut TransferSession,
    listener: &TcpListener,
    connect_timeout: Duration,
    control: &ControlChannel,
    notifier: &mut ProgressNotifier,
    refresher: Option<&Arc<dyn TokenRefresh>>,
    env: &mut Vec<(String, String)>,
) -> Result<()> {
    let (stream, peer) = timeout(connect_timeout, listener.accept())
        .await
        .map_err(|_elapsed| {
            AppError::ConnectTimeout(format!(
                "worker did not connect to the management port within {connect_timeout:?}"
            ))
        })?
        .map_err(|err| AppError::Io(format!("management accept failed: {err}")))?;
    debug!(
        job_id = %session.job_id,
        session_index = session.session_index,
        %peer,
        "management channel connected"
    );

    // Exactly one connection is accepted; the channel stays open strictly
    // until EOF. Payloads are decoded as UTF-8; file names may be
    // non-ASCII.
    let (read_half, write_half) = stream.into_split();
    control.install(write_half).await;

    let loop_result = run_event_loop(session, read_half, control, notifier).await;
    control.clear().await;

    let last_terminal = loop_result?;
    classify_terminal(last_terminal.as_ref(), env, refresher)
}

/// Drive the framed read loop until end-of-stream.
///
/// Records the worker-assigned session id from `INIT`, forwards every event
/// to the notifier, polls the side-channel command file once per decoded
/// event, and returns the last terminal event seen, if any.
///
/// # Errors
///
/// Returns `AppError::Protocol` when the stream violates the frame grammar
/// and `AppError::Io` on socket failures; both are fatal to the session.
pub async fn run_event_loop<R>(
    session: &mut TransferSession,
    reader: R,
    control: &ControlChannel,
    notifier: &mut ProgressNotifier,
) -> Result<Option<Event>>
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(reader, MgmtCodec::new());
    let mut last_terminal = None;

    while let Some(item) = framed.next().await {
        let event = item?;

        if event.event_type() == Some(EventType::Init) {
            if let Some(id) = event.session_id() {
                session.worker_session_id = Some(id.to_owned());
            }
        }

        notifier.observe(&event).await;

        if event.event_type().is_some_and(EventType::is_terminal) {
            last_terminal = Some(event);
        }

        poll_command_file(session, control).await;
    }

    Ok(last_terminal)
}

/// Classify the last terminal event of a monitored execution.
///
/// `DONE` is success. An `ERROR` whose description matches the
/// credential-expiry pattern is retryable when a refresh capability is
/// configured; the refreshed token replaces the one in `env` so the next
/// attempt picks it up. Any other `ERROR` is fatal, and a missing terminal
/// event is a protocol violation.
///
/// # Errors
///
/// `AppError::Worker` with the event description, or `AppError::Protocol`
/// when the channel closed without a terminal event.
pub fn classify_terminal(
    last: Option<&Event>,
    env: &mut Vec<(String, String)>,
    refresher: Option<&Arc<dyn TokenRefresh>>,
) -> Result<()> {
    let Some(event) = last else {
        return Err(AppError::Protocol(
            "management channel closed without a terminal event".into(),
        ));
    };

    match event.event_type() {
        Some(EventType::Done) => Ok(()),
        Some(EventType::Error) => {
            let description = event.description().to_owned();
            if credential_expired(&description) {
                if let Some(refresher) = refresher {
                    let token = refresher.refresh()?;
                    set_env(env, ENV_TOKEN, token);
                    info!("credential refreshed after expiry report");
                    return Err(AppError::Worker {
                        message: description,
                        retryable: true,
                    });
                }
            }
            Err(AppError::Worker {
                message: description,
                retryable: false,
            })
        }
        _ => Err(AppError::Protocol(
            "management channel closed without a terminal event".into(),
        )),
    }
}

/// Whether a worker error description reports an expired credential.
#[must_use]
pub fn credential_expired(description: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(CREDENTIAL_EXPIRY_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(description))
}

/// Management-port arguments prepended to the worker argv.
///
/// The async worker variant takes an exclusive-port flag; every other
/// worker takes `-M`.
#[must_use]
pub fn management_args(executable: &Path, port: u16) -> Vec<String> {
    let stem = executable.file_stem().and_then(OsStr::to_str).unwrap_or("");
    if stem == "async" {
        vec![format!("--exclusive-mgmt-port={port}")]
    } else {
        vec!["-M".into(), port.to_string()]
    }
}

/// Consume the session's side-channel command file, at most once.
///
/// The file carries one command type token; it is deleted before being
/// applied so a failed write cannot replay it. Failures are logged, never
/// fatal to the session.
async fn poll_command_file(session: &TransferSession, control: &ControlChannel) {
    let Some(path) = &session.command_file else {
        return;
    };
    let Ok(content) = tokio::fs::read_to_string(path).await else {
        return; // absent or unreadable: nothing to apply
    };
    if let Err(err) = tokio::fs::remove_file(path).await {
        warn!(job_id = %session.job_id, %err, "failed to delete command file, skipping");
        return;
    }

    let command = content.trim();
    if command.is_empty() {
        return;
    }

    let mut fields = BTreeMap::new();
    fields.insert("type".to_owned(), command.to_owned());
    let frame = encode_command(&fields);
    if let Err(err) = control.send(frame.as_bytes()).await {
        warn!(job_id = %session.job_id, command, %err, "failed to inject side-channel command");
    } else {
        info!(
            job_id = %session.job_id,
            session_index = session.session_index,
            command,
            "injected side-channel command"
        );
    }
}

/// Always-run cleanup: interrupt the worker if still alive, reap exactly
/// once, and surface an abnormal exit when no error is already propagating.
async fn conclude(mut child: Child, result: Result<()>) -> Result<()> {
    if matches!(child.try_wait(), Ok(None)) {
        interrupt(&mut child);
    }

    let status = match timeout(INTERRUPT_GRACE, child.wait()).await {
        Ok(status) => status,
        Err(_elapsed) => {
            warn!("worker ignored interrupt, forcing kill");
            if let Err(err) = child.kill().await {
                warn!(%err, "failed to force-kill worker");
            }
            child.wait().await
        }
    };

    match (result, status) {
        (Err(err), _) => Err(err),
        (Ok(()), Ok(status)) if status.success() => Ok(()),
        (Ok(()), Ok(status)) => Err(AppError::AbnormalExit(format!(
            "worker exited unsuccessfully: {status}"
        ))),
        (Ok(()), Err(err)) => Err(AppError::Io(format!("failed to reap worker: {err}"))),
    }
}

/// Send the interrupt signal to a still-running worker.
#[cfg(unix)]
fn interrupt(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else { return };
    let Ok(pid) = i32::try_from(pid) else { return };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGINT) {
        warn!(%err, pid, "failed to interrupt worker");
    }
}

/// Send the interrupt signal to a still-running worker.
#[cfg(not(unix))]
fn interrupt(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        warn!(%err, "failed to interrupt worker");
    }
}

/// Build the worker command with the environment policy applied.
fn base_command(executable: &Path, args: &[String], env: &[(String, String)]) -> Command {
    let mut cmd = Command::new(executable);
    cmd.args(args);
    cmd.env_clear();
    for &key in INHERITED_ENV_VARS {
        if let Ok(value) = std::env::var(key) {
            cmd.env(key, value);
        }
    }
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

/// Replace or append one environment pair.
fn set_env(env: &mut Vec<(String, String)>, key: &str, value: String) {
    if let Some(entry) = env.iter_mut().find(|(k, _)| k == key) {
        entry.1 = value;
    } else {
        env.push((key.to_owned(), value));
    }
}
