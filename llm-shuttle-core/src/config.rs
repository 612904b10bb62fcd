use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::extract::CodeFence;

/// Bounded retry for establishing the reply stream.
///
/// Only the connection step is retried; once fragments flow, a failure is
/// final. The default makes a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << doublings)
    }
}

/// Where and how to reach the chat endpoint.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base URL of an OpenAI-compatible server, e.g. `http://localhost:1234`.
    pub endpoint: String,
    /// Sent as a bearer token when present and non-empty.
    pub api_key: Option<String>,
    pub connect_timeout: Option<Duration>,
    /// Maximum wait for each reply fragment.
    pub fragment_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl ConnectionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            connect_timeout: Some(Duration::from_secs(30)),
            fragment_timeout: Some(Duration::from_secs(120)),
            retry: RetryPolicy::default(),
        }
    }
}

/// Artifact layout under the output root.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub root: PathBuf,
    /// Extension of `input.*` and `output.*`.
    pub text_extension: String,
    /// Extension of `CodeBlock.NNN.*`.
    pub code_extension: String,
}

impl OutputConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            text_extension: "md".to_string(),
            code_extension: "rs".to_string(),
        }
    }
}

/// Settings for the code-execution middleware.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub enabled: bool,
    pub timeout: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Everything one pipeline run needs apart from its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub connection: ConnectionConfig,
    /// Every task runs once per model, in this order.
    pub models: Vec<String>,
    pub output: OutputConfig,
    pub fence: CodeFence,
    pub execution: ExecutionConfig,
    /// Run only the task with this name.
    pub task_filter: Option<String>,
}

impl PipelineConfig {
    pub fn trace_loaded(&self) {
        info!(
            endpoint = %self.connection.endpoint,
            models = ?self.models,
            output_root = %self.output.root.display(),
            fence = self.fence.prefix(),
            execution = self.execution.enabled,
            "Loaded PipelineConfig"
        );
        debug!(
            retry = ?self.connection.retry,
            fragment_timeout = ?self.connection.fragment_timeout,
            "PipelineConfig connection details"
        );
    }
}
