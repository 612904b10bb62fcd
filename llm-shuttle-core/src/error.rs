//! Error types shared across the pipeline.
//!
//! Transport problems surface as [`ChatError`], template loading as
//! [`TemplateError`], and the orchestrator wraps both together with its own
//! persistence failures in [`OrchestrateError`].

use std::path::PathBuf;
use std::time::Duration;

/// Failure while talking to the chat endpoint or pulling the reply stream.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("failed to reach chat endpoint {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("chat endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("reply stream interrupted: {0}")]
    Stream(String),

    #[error("no reply fragment arrived within {0:?}")]
    Timeout(Duration),
}

impl ChatError {
    /// Whether a fresh connection attempt might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Connect { .. } => true,
            ChatError::Status { status, .. } => *status == 429 || *status >= 500,
            ChatError::Stream(_) | ChatError::Timeout(_) => false,
        }
    }
}

/// Failure while loading directive or task templates.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to list task templates in {path}: {source}")]
    ListTasks {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("task {name} is defined twice: {first} and {second}")]
    DuplicateTask {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Fatal failure of an orchestration run. The first one aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrateError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write artifact {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} names {first:?} and {second:?} both map to output directory {component:?}")]
    OutputCollision {
        kind: &'static str,
        first: String,
        second: String,
        component: String,
    },

    #[error("failed to write to console: {0}")]
    Console(#[source] std::io::Error),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}
