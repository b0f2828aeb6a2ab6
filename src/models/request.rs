//! Transfer request model.

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Direction of a transfer relative to this host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Upload local paths to the remote destination.
    Send,
    /// Download remote paths to the local destination.
    Receive,
}

impl Direction {
    /// Mode value understood by the worker's `--mode` flag.
    #[must_use]
    pub fn mode(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Receive => "recv",
        }
    }
}

/// Credential material carried by a request. Exactly one kind is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Interactive/user password.
    Password(String),
    /// Bearer token issued by the transfer platform.
    Token(String),
    /// SSH private key content.
    Key(String),
}

/// One logical transfer request as submitted by the caller.
///
/// Immutable from the engine's point of view: the compiler and orchestrator
/// always deep-clone before any per-session mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TransferRequest {
    /// Transfer direction.
    pub direction: Direction,
    /// Remote endpoint host.
    pub host: String,
    /// Remote endpoint user.
    pub user: String,
    /// Paths to transfer (local for send, remote for receive).
    pub paths: Vec<String>,
    /// Destination root on the receiving side.
    pub destination: String,
    /// Password credential.
    #[serde(default)]
    pub password: Option<String>,
    /// Bearer token credential.
    #[serde(default)]
    pub token: Option<String>,
    /// SSH private key credential.
    #[serde(default)]
    pub key: Option<String>,
    /// Requested fan-out count; absent or zero means a single session.
    #[serde(default)]
    pub multi_session: Option<u32>,
    /// Explicit TCP control port.
    #[serde(default)]
    pub tcp_port: Option<u16>,
    /// Explicit UDP data port (the base port under multi-session increment).
    #[serde(default)]
    pub udp_port: Option<u16>,
    /// Caller tags forwarded to the worker.
    #[serde(default)]
    pub tags: Option<serde_json::Value>,
}

impl TransferRequest {
    /// Extract the single credential carried by the request.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when no credential or more than one
    /// credential kind is present.
    pub fn credential(&self) -> Result<Credential> {
        let mut found: Vec<Credential> = Vec::new();
        if let Some(password) = &self.password {
            found.push(Credential::Password(password.clone()));
        }
        if let Some(token) = &self.token {
            found.push(Credential::Token(token.clone()));
        }
        if let Some(key) = &self.key {
            found.push(Credential::Key(key.clone()));
        }

        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(AppError::Config(
                "request carries no credential: exactly one of password, token, key is required"
                    .into(),
            )),
            _ => Err(AppError::Config(
                "request carries more than one credential: exactly one of password, token, key is required"
                    .into(),
            )),
        }
    }

    /// Effective session count for this request.
    #[must_use]
    pub fn session_count(&self) -> u32 {
        match self.multi_session {
            Some(n) if n > 0 => n,
            _ => 1,
        }
    }
}
