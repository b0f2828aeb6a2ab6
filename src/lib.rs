#![forbid(unsafe_code)]

pub mod agent;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod locator;
pub mod mgmt;
pub mod models;
pub mod notify;
pub mod supervisor;

pub use config::AgentConfig;
pub use errors::{AppError, Result};
