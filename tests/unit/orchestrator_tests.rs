//! Unit tests for multi-session fan-out and completion aggregation.

use std::sync::Arc;

use chrono::Utc;
use serial_test::serial;
use tokio::sync::mpsc;

use transfer_agent::agent::{self, TransferAgent};
use transfer_agent::config::AgentConfig;
use transfer_agent::models::request::{Direction, TransferRequest};
use transfer_agent::models::session::TransferOutcome;
use transfer_agent::notify::TransferNotification;
use transfer_agent::supervisor::orchestrator::{
    join_all, session_args, session_udp_port, LocalAgent,
};
use transfer_agent::supervisor::registry::{ControlChannel, SessionHandle};
use transfer_agent::AppError;

fn request() -> TransferRequest {
    TransferRequest {
        direction: Direction::Send,
        host: "transfer.example.com".into(),
        user: "xfer".into(),
        paths: vec!["/data/report.bin".into()],
        destination: "/inbox".into(),
        password: None,
        token: Some("Bearer abc123".into()),
        key: None,
        multi_session: None,
        tcp_port: None,
        udp_port: None,
        tags: None,
    }
}

fn outcome(job_id: &str, session_index: u32, error: Option<AppError>) -> TransferOutcome {
    let now = Utc::now();
    TransferOutcome {
        job_id: job_id.to_owned(),
        session_index,
        worker_session_id: None,
        started_at: now,
        finished_at: now,
        error,
    }
}

// ── Per-session arguments ───────────────────────────────────────────────────

/// Fan-out sessions get distinct index arguments and incremented ports.
#[test]
fn fan_out_sessions_get_index_and_port_offsets() {
    let compiled = vec!["--mode=send".to_owned()];

    let ports: Vec<Option<u16>> = (1..=3)
        .map(|i| session_udp_port(None, 33_001, i, 3, true))
        .collect();
    assert_eq!(ports, vec![Some(33_001), Some(33_002), Some(33_003)]);

    let args = session_args(&compiled, 2, 3, ports[1]);
    assert_eq!(
        args,
        vec![
            "--mode=send".to_owned(),
            "-C".to_owned(),
            "2:3".to_owned(),
            "-O".to_owned(),
            "33002".to_owned(),
        ]
    );
}

/// An explicit base port seeds the increment.
#[test]
fn explicit_base_port_seeds_increment() {
    assert_eq!(session_udp_port(Some(40_000), 33_001, 2, 2, true), Some(40_001));
}

/// With increment disabled the explicit port passes through unchanged for
/// every session.
#[test]
fn increment_disabled_passes_explicit_port_through() {
    assert_eq!(session_udp_port(Some(40_000), 33_001, 1, 4, false), Some(40_000));
    assert_eq!(session_udp_port(Some(40_000), 33_001, 4, 4, false), Some(40_000));
    assert_eq!(session_udp_port(None, 33_001, 2, 4, false), None);
}

/// Single sessions carry no index argument and only an explicit port.
#[test]
fn single_session_has_no_index_argument() {
    assert_eq!(session_udp_port(None, 33_001, 1, 1, true), None);
    let args = session_args(&["--mode=send".to_owned()], 1, 1, None);
    assert_eq!(args, vec!["--mode=send".to_owned()]);
}

// ── Outcome aggregation ─────────────────────────────────────────────────────

/// K sessions with J failures join into K outcomes with exactly J
/// non-success entries; nothing raises.
#[tokio::test]
async fn join_reports_partial_failure_individually() {
    let handles = vec![
        SessionHandle {
            job_id: "job-a".into(),
            session_index: 1,
            control: ControlChannel::new(),
            task: tokio::spawn(async { outcome("job-a", 1, None) }),
        },
        SessionHandle {
            job_id: "job-a".into(),
            session_index: 2,
            control: ControlChannel::new(),
            task: tokio::spawn(async {
                outcome(
                    "job-a",
                    2,
                    Some(AppError::Worker {
                        message: "Server aborted session".into(),
                        retryable: false,
                    }),
                )
            }),
        },
        SessionHandle {
            job_id: "job-a".into(),
            session_index: 3,
            control: ControlChannel::new(),
            task: tokio::spawn(async { outcome("job-a", 3, None) }),
        },
    ];

    let outcomes = join_all(handles).await;
    assert_eq!(outcomes.len(), 3);
    let failed: Vec<u32> = outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(|o| o.session_index)
        .collect();
    assert_eq!(failed, vec![2]);
}

/// A session task that dies is converted to a non-success outcome rather
/// than propagating across the join boundary.
#[tokio::test]
async fn dead_session_task_becomes_failed_outcome() {
    let task: tokio::task::JoinHandle<TransferOutcome> =
        tokio::spawn(async { std::future::pending().await });
    task.abort();

    let handles = vec![SessionHandle {
        job_id: "job-a".into(),
        session_index: 1,
        control: ControlChannel::new(),
        task,
    }];

    let outcomes = join_all(handles).await;
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].is_success());
}

// ── Fan-out ─────────────────────────────────────────────────────────────────

/// A request with N = 3 spawns exactly three sessions sharing one job id,
/// all succeeding, and the registry ends empty.
#[tokio::test]
#[serial]
async fn fan_out_spawns_n_sessions_sharing_one_job_id() {
    let mut config = AgentConfig::default();
    config.worker.monitor = false;
    config.worker.executable = "true".into();
    config.worker.spawn_delay_seconds = 0;

    let agent = agent::for_config(Arc::new(config));
    let (tx, mut rx) = mpsc::channel(64);
    agent.register_listener(tx).await;

    let mut req = request();
    req.multi_session = Some(3);

    let job_id = agent.start_transfer(req, None).await.unwrap();
    let outcomes = agent.wait_for_transfers_completion().await;

    assert_eq!(outcomes.len(), 3, "exactly N sessions are created");
    assert!(outcomes.iter().all(|o| o.job_id == job_id));
    assert!(outcomes.iter().all(TransferOutcome::is_success));
    let mut indexes: Vec<u32> = outcomes.iter().map(|o| o.session_index).collect();
    indexes.sort_unstable();
    assert_eq!(indexes, vec![1, 2, 3]);

    assert!(
        agent.wait_for_transfers_completion().await.is_empty(),
        "a completed wait leaves the registry empty"
    );

    let first = rx.try_recv().unwrap();
    assert_eq!(
        first,
        TransferNotification::SessionsStarting {
            job_id: job_id.clone()
        }
    );
    let mut saw_end = false;
    while let Ok(notification) = rx.try_recv() {
        if notification == (TransferNotification::End { job_id: job_id.clone() }) {
            saw_end = true;
        }
    }
    assert!(saw_end, "the job end notification follows the join");
}

/// A zero or absent fan-out count means a single session.
#[tokio::test]
#[serial]
async fn absent_fan_out_means_single_session() {
    let mut config = AgentConfig::default();
    config.worker.monitor = false;
    config.worker.executable = "true".into();

    let agent = LocalAgent::new(Arc::new(config));
    let mut req = request();
    req.multi_session = Some(0);

    agent.start_transfer(req, None).await.unwrap();
    let outcomes = agent.wait_for_transfers_completion().await;
    assert_eq!(outcomes.len(), 1);
}

/// A worker that never connects surfaces as a non-success outcome once the
/// retry attempts run out, with the worker reaped.
#[tokio::test]
#[serial]
async fn connect_timeout_surfaces_as_failed_outcome() {
    let mut config = AgentConfig::default();
    config.worker.executable = "sleep".into();
    config.worker.connect_timeout_seconds = 1;
    config.resume.max_attempts = 1;
    config.resume.initial_backoff_seconds = 0;

    let agent = LocalAgent::new(Arc::new(config));
    let mut req = request();
    // The stand-in worker ignores the compiled argv and simply never
    // connects; every path below exercises the timeout.
    req.paths = vec!["5".into()];

    agent.start_transfer(req, None).await.unwrap();
    let outcomes = agent.wait_for_transfers_completion().await;

    assert_eq!(outcomes.len(), 1);
    let error = outcomes[0].error.as_ref().expect("outcome must be failed");
    assert_eq!(error.code(), "RETRIES_EXHAUSTED");
    assert!(
        error.to_string().contains("connect timeout"),
        "the terminal error must carry the timeout classification: {error}"
    );
}

/// An unlocatable worker executable fails the submission itself.
#[tokio::test]
async fn missing_worker_executable_fails_start() {
    let mut config = AgentConfig::default();
    config.worker.executable = "no-such-transfer-worker".into();

    let agent = LocalAgent::new(Arc::new(config));
    let err = agent.start_transfer(request(), None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got: {err}");
}

/// Commands addressed to an unknown job report not-found.
#[tokio::test]
async fn command_to_unknown_job_reports_not_found() {
    let agent = LocalAgent::new(Arc::new(AgentConfig::default()));
    let mut command = agent::CommandFields::new();
    command.insert("type".into(), "STOP".into());

    let err = agent
        .send_command(command, Some("missing-job".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got: {err}");
}
