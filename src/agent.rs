//! Transfer agent seam.
//!
//! [`TransferAgent`] decouples callers (the CLI layer, alternate
//! REST-driven agents, progress UIs) from the execution backend. The local
//! engine in this crate is one implementation; selection is a tagged
//! construction through [`for_config`], not an inheritance chain.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{AgentConfig, AgentKind};
use crate::models::request::TransferRequest;
use crate::models::session::TransferOutcome;
use crate::notify::TransferNotification;
use crate::supervisor::orchestrator::LocalAgent;
use crate::Result;

/// Injected capability for refreshing an expired bearer token.
///
/// The supervisor calls this when the worker reports a credential-expiry
/// error; the fresh token replaces the expired one in the session
/// environment before the retry.
pub trait TokenRefresh: Send + Sync {
    /// Produce a fresh token to replace the expired one.
    ///
    /// # Errors
    ///
    /// Returns the underlying error when a new token cannot be obtained;
    /// the session then fails with that error instead of retrying.
    fn refresh(&self) -> Result<String>;
}

/// Runtime command fields addressed to running sessions, keyed in the
/// normalized lower_snake form and encoded onto the management channel.
pub type CommandFields = BTreeMap<String, String>;

/// Uniform surface over interchangeable transfer execution backends.
pub trait TransferAgent: Send + Sync {
    /// Submit one logical transfer request.
    ///
    /// Returns the caller-visible job id grouping every session spawned for
    /// the request.
    fn start_transfer(
        &self,
        request: TransferRequest,
        refresher: Option<Arc<dyn TokenRefresh>>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    /// Join every active session and return one outcome per session.
    ///
    /// Individual failures never raise; the registry is left empty.
    fn wait_for_transfers_completion(
        &self,
    ) -> Pin<Box<dyn Future<Output = Vec<TransferOutcome>> + Send + '_>>;

    /// Inject a runtime command into one job's sessions, or into all
    /// sessions when `job_id` is absent.
    fn send_command(
        &self,
        command: CommandFields,
        job_id: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Register the progress listener receiving lifecycle notifications.
    fn register_listener(
        &self,
        tx: mpsc::Sender<TransferNotification>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Construct the agent variant selected by configuration.
#[must_use]
pub fn for_config(config: Arc<AgentConfig>) -> Arc<dyn TransferAgent> {
    match config.agent {
        AgentKind::Local => Arc::new(LocalAgent::new(config)),
    }
}
