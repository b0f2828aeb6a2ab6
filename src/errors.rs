//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Every failure raised by the supervision stack is normalized into this one
/// family, so the resume policy needs only the single
/// [`AppError::is_retryable`] predicate and callers get a machine-readable
/// [`AppError::code`] alongside the description.
#[derive(Debug)]
pub enum AppError {
    /// Invalid or contradictory request/configuration input.
    Config(String),
    /// Worker executable could not be started.
    Spawn(String),
    /// Worker never connected to the management port within the bound.
    ConnectTimeout(String),
    /// Malformed management-channel framing.
    Protocol(String),
    /// Worker reported a terminal `ERROR` event on the management channel.
    Worker {
        /// Description carried by the worker's `ERROR` event.
        message: String,
        /// Whether the resume policy may retry the session.
        retryable: bool,
    },
    /// Worker exited unsuccessfully without reporting an error first.
    AbnormalExit(String),
    /// Resume policy ran out of attempts.
    RetriesExhausted(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Machine-readable code identifying the failure kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Spawn(_) => "SPAWN",
            Self::ConnectTimeout(_) => "CONNECT_TIMEOUT",
            Self::Protocol(_) => "PROTOCOL",
            Self::Worker { .. } => "WORKER",
            Self::AbnormalExit(_) => "ABNORMAL_EXIT",
            Self::RetriesExhausted(_) => "RETRIES_EXHAUSTED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Io(_) => "IO",
        }
    }

    /// Single retryable/fatal predicate applied by the resume policy.
    ///
    /// Spawn failures and connect timeouts are transient. A worker-reported
    /// error is retryable only when the supervisor classified it so
    /// (credential expiry with a refresh capability available). Everything
    /// else is fatal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Spawn(_) | Self::ConnectTimeout(_) => true,
            Self::Worker { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::ConnectTimeout(msg) => write!(f, "connect timeout: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Worker { message, .. } => write!(f, "worker: {message}"),
            Self::AbnormalExit(msg) => write!(f, "abnormal exit: {msg}"),
            Self::RetriesExhausted(msg) => write!(f, "retries exhausted: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
