//! Transfer spec compilation.
//!
//! Pure translation from an abstract [`TransferRequest`] into the argv and
//! environment of one worker invocation. The caller's request is never
//! mutated: compilation deep-clones it, embeds a fresh job id and the
//! retry-timeout tag into the working copy, and emits credentials through
//! the environment only. The management-port flag is prepended later by the
//! process supervisor, and the multi-session arguments by the orchestrator.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::models::request::{Credential, TransferRequest};
use crate::{AppError, Result};

/// Environment variable carrying the password credential.
pub const ENV_PASSWORD: &str = "ASPERA_SCP_PASS";
/// Environment variable carrying the bearer-token credential.
pub const ENV_TOKEN: &str = "ASPERA_SCP_TOKEN";
/// Environment variable carrying the SSH private-key credential.
pub const ENV_KEY: &str = "ASPERA_SCP_KEY";

/// Compiled invocation for one request, before per-session adjustments.
#[derive(Debug, Clone)]
pub struct CompiledSpec {
    /// Caller-visible job id shared by every session of the request.
    pub job_id: String,
    /// Worker executable name, resolved through the locator at spawn time.
    pub executable: String,
    /// Argument vector, secrets excluded.
    pub args: Vec<String>,
    /// Environment pairs, secrets included.
    pub env: Vec<(String, String)>,
}

/// Compile a request against the agent options.
///
/// # Errors
///
/// Returns `AppError::Config` when the request carries no credential, more
/// than one credential kind, or a non-object `tags` value.
pub fn compile(request: &TransferRequest, config: &AgentConfig) -> Result<CompiledSpec> {
    let credential = request.credential()?;

    // Work on a deep clone; per-request mutation stays in the working copy.
    let mut request = request.clone();
    let job_id = Uuid::new_v4().to_string();

    let mut tags = match request.tags.take() {
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(AppError::Config("request tags must be a JSON object".into()));
        }
        None => Map::new(),
    };
    tags.insert("job_id".into(), Value::String(job_id.clone()));
    tags.insert(
        "xfer_retry".into(),
        Value::from(config.resume.retry_timeout_seconds),
    );

    let mut args = Vec::with_capacity(request.paths.len() + 12);
    args.push(format!("--mode={}", request.direction.mode()));
    args.push(format!("--host={}", request.host));
    args.push(format!("--user={}", request.user));
    if let Some(port) = request.tcp_port {
        args.push("-P".into());
        args.push(port.to_string());
    }
    if config.worker.quiet {
        args.push("-q".into());
    }
    args.push("-k".into());
    args.push(config.resume.file_resume_level.to_string());
    if let Some(key_path) = &config.ssh.key_path {
        args.push("-i".into());
        args.push(key_path.display().to_string());
    }
    for cert in &config.ssh.trusted_certs {
        args.push(format!("--trusted-certs={}", cert.display()));
    }
    args.push(format!("--tags={}", Value::Object(tags)));
    args.extend(request.paths.iter().cloned());
    args.push(request.destination.clone());

    let env = vec![match credential {
        Credential::Password(password) => (ENV_PASSWORD.to_owned(), password),
        Credential::Token(token) => (ENV_TOKEN.to_owned(), token),
        Credential::Key(key) => (ENV_KEY.to_owned(), key),
    }];

    Ok(CompiledSpec {
        job_id,
        executable: config.worker.executable.clone(),
        args,
        env,
    })
}
