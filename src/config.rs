//! Agent configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Default UDP data port used by the worker when no explicit base is given.
pub const DEFAULT_UDP_PORT: u16 = 33001;

/// Execution backend selected at construction time.
///
/// The local engine in this crate is one of several interchangeable agents;
/// remote-API-driven variants live behind the same [`crate::agent::TransferAgent`]
/// seam and are selected here.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Spawn and supervise worker processes on this host.
    #[default]
    Local,
}

/// Worker process settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Worker executable name, resolved through the locator.
    #[serde(default = "default_executable")]
    pub executable: String,
    /// Directories searched before `PATH` when locating the executable.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    /// Whether the management channel is monitored. When disabled the worker
    /// is spawned fire-and-forget.
    #[serde(default = "default_true")]
    pub monitor: bool,
    /// Pass the quiet flag to the worker, suppressing its own console output.
    #[serde(default = "default_true")]
    pub quiet: bool,
    /// Seconds to wait for the worker's inbound management connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Delay applied before spawning sessions 2..N of a multi-session request.
    #[serde(default = "default_spawn_delay")]
    pub spawn_delay_seconds: u64,
    /// Directory polled for side-channel command files, one per session.
    /// Absent means the side channel is disabled.
    #[serde(default)]
    pub command_dir: Option<PathBuf>,
}

impl WorkerConfig {
    /// Bound on the wait for the worker's management connection.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Inter-spawn delay for multi-session fan-out.
    #[must_use]
    pub fn spawn_delay(&self) -> Duration {
        Duration::from_secs(self.spawn_delay_seconds)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            search_paths: Vec::new(),
            monitor: true,
            quiet: true,
            connect_timeout_seconds: default_connect_timeout(),
            spawn_delay_seconds: default_spawn_delay(),
            command_dir: None,
        }
    }
}

/// Multi-session fan-out settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MultiSessionConfig {
    /// Give each session its own UDP port, incremented from the base.
    #[serde(default = "default_true")]
    pub port_increment: bool,
    /// Base UDP port when the request does not carry an explicit one.
    #[serde(default = "default_udp_port")]
    pub base_udp_port: u16,
}

impl Default for MultiSessionConfig {
    fn default() -> Self {
        Self {
            port_increment: true,
            base_udp_port: DEFAULT_UDP_PORT,
        }
    }
}

/// Resume policy parameters for one supervised execution.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ResumeConfig {
    /// Total attempts allowed per session, first attempt included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff before the first retry.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_seconds: u64,
    /// Ceiling the doubling backoff never exceeds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_seconds: u64,
    /// Retry window, in seconds, advertised to the worker through the
    /// request tags.
    #[serde(default = "default_retry_timeout")]
    pub retry_timeout_seconds: u64,
    /// Worker file-level resume mode (`-k`): 0 off, 1 attributes,
    /// 2 sparse checksum, 3 full checksum.
    #[serde(default = "default_file_resume_level")]
    pub file_resume_level: u8,
}

impl ResumeConfig {
    /// Backoff applied before the first retry.
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_seconds)
    }

    /// Backoff ceiling.
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds)
    }
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_seconds: default_initial_backoff(),
            max_backoff_seconds: default_max_backoff(),
            retry_timeout_seconds: default_retry_timeout(),
            file_resume_level: default_file_resume_level(),
        }
    }
}

/// SSH transport material handed to the worker.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SshConfig {
    /// Private key file selected with `-i`.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Certificates the worker should trust for WSS/HTTPS fallback paths.
    #[serde(default)]
    pub trusted_certs: Vec<PathBuf>,
}

fn default_executable() -> String {
    "ascp".into()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    2
}

fn default_spawn_delay() -> u64 {
    2
}

fn default_udp_port() -> u16 {
    DEFAULT_UDP_PORT
}

fn default_max_attempts() -> u32 {
    7
}

fn default_initial_backoff() -> u64 {
    2
}

fn default_max_backoff() -> u64 {
    60
}

fn default_retry_timeout() -> u64 {
    3600
}

fn default_file_resume_level() -> u8 {
    1
}

/// Agent configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Execution backend variant.
    #[serde(default)]
    pub agent: AgentKind,
    /// Worker process settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Multi-session fan-out settings.
    #[serde(default)]
    pub multi_session: MultiSessionConfig,
    /// Resume policy parameters.
    #[serde(default)]
    pub resume: ResumeConfig,
    /// SSH transport material.
    #[serde(default)]
    pub ssh: SshConfig,
}

impl AgentConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.worker.executable.is_empty() {
            return Err(AppError::Config("worker.executable must not be empty".into()));
        }

        if self.worker.connect_timeout_seconds == 0 {
            return Err(AppError::Config(
                "worker.connect_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.resume.max_attempts == 0 {
            return Err(AppError::Config(
                "resume.max_attempts must be greater than zero".into(),
            ));
        }

        if self.resume.initial_backoff_seconds > self.resume.max_backoff_seconds {
            return Err(AppError::Config(
                "resume.initial_backoff_seconds must not exceed resume.max_backoff_seconds".into(),
            ));
        }

        if self.resume.file_resume_level > 3 {
            return Err(AppError::Config(
                "resume.file_resume_level must be between 0 and 3".into(),
            ));
        }

        Ok(())
    }
}
