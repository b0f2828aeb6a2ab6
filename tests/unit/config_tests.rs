//! Unit tests for agent configuration parsing and validation.

use transfer_agent::config::{AgentConfig, AgentKind, DEFAULT_UDP_PORT};
use transfer_agent::AppError;

/// An empty document parses entirely from defaults.
#[test]
fn empty_toml_uses_defaults() {
    let config = AgentConfig::from_toml_str("").unwrap();

    assert_eq!(config.agent, AgentKind::Local);
    assert_eq!(config.worker.executable, "ascp");
    assert!(config.worker.monitor);
    assert!(config.worker.quiet);
    assert_eq!(config.worker.connect_timeout_seconds, 2);
    assert_eq!(config.worker.spawn_delay_seconds, 2);
    assert!(config.worker.command_dir.is_none());
    assert!(config.multi_session.port_increment);
    assert_eq!(config.multi_session.base_udp_port, DEFAULT_UDP_PORT);
    assert_eq!(config.resume.max_attempts, 7);
    assert_eq!(config.resume.initial_backoff_seconds, 2);
    assert_eq!(config.resume.max_backoff_seconds, 60);
    assert_eq!(config.resume.retry_timeout_seconds, 3600);
    assert_eq!(config.resume.file_resume_level, 1);
    assert!(config.ssh.key_path.is_none());
    assert!(config.ssh.trusted_certs.is_empty());
}

/// The programmatic default matches the parsed default.
#[test]
fn default_impl_matches_empty_toml() {
    assert_eq!(AgentConfig::default(), AgentConfig::from_toml_str("").unwrap());
}

/// A fully specified document overrides every default.
#[test]
fn full_toml_overrides_defaults() {
    let raw = r#"
        [worker]
        executable = "ascp4"
        search_paths = ["/opt/transfer/bin"]
        monitor = false
        quiet = false
        connect_timeout_seconds = 10
        spawn_delay_seconds = 1
        command_dir = "/var/run/transfer-agent"

        [multi_session]
        port_increment = false
        base_udp_port = 33101

        [resume]
        max_attempts = 3
        initial_backoff_seconds = 1
        max_backoff_seconds = 30
        retry_timeout_seconds = 600
        file_resume_level = 3

        [ssh]
        key_path = "/etc/keys/transfer_id"
        trusted_certs = ["/etc/certs/ca.pem"]
    "#;

    let config = AgentConfig::from_toml_str(raw).unwrap();
    assert_eq!(config.worker.executable, "ascp4");
    assert!(!config.worker.monitor);
    assert!(!config.worker.quiet);
    assert_eq!(config.worker.connect_timeout_seconds, 10);
    assert!(config.worker.command_dir.is_some());
    assert!(!config.multi_session.port_increment);
    assert_eq!(config.multi_session.base_udp_port, 33101);
    assert_eq!(config.resume.max_attempts, 3);
    assert_eq!(config.resume.file_resume_level, 3);
    assert_eq!(
        config.ssh.trusted_certs,
        vec![std::path::PathBuf::from("/etc/certs/ca.pem")]
    );
}

/// Zero attempts are rejected.
#[test]
fn zero_max_attempts_is_rejected() {
    let err = AgentConfig::from_toml_str("[resume]\nmax_attempts = 0\n").unwrap_err();
    assert!(matches!(err, AppError::Config(_)), "got: {err}");
}

/// A zero connect timeout is rejected.
#[test]
fn zero_connect_timeout_is_rejected() {
    let err =
        AgentConfig::from_toml_str("[worker]\nconnect_timeout_seconds = 0\n").unwrap_err();
    assert!(matches!(err, AppError::Config(_)), "got: {err}");
}

/// An initial backoff above the ceiling is rejected.
#[test]
fn inverted_backoff_bounds_are_rejected() {
    let raw = "[resume]\ninitial_backoff_seconds = 120\nmax_backoff_seconds = 60\n";
    let err = AgentConfig::from_toml_str(raw).unwrap_err();
    assert!(matches!(err, AppError::Config(_)), "got: {err}");
}

/// File resume levels beyond the worker's range are rejected.
#[test]
fn out_of_range_file_resume_level_is_rejected() {
    let err = AgentConfig::from_toml_str("[resume]\nfile_resume_level = 4\n").unwrap_err();
    assert!(matches!(err, AppError::Config(_)), "got: {err}");
}

/// An empty executable name is rejected.
#[test]
fn empty_executable_is_rejected() {
    let err = AgentConfig::from_toml_str("[worker]\nexecutable = \"\"\n").unwrap_err();
    assert!(matches!(err, AppError::Config(_)), "got: {err}");
}

/// Malformed TOML reports a configuration error.
#[test]
fn malformed_toml_is_config_error() {
    let err = AgentConfig::from_toml_str("worker = not toml").unwrap_err();
    assert!(matches!(err, AppError::Config(_)), "got: {err}");
}
