/// `load_config` module: Loads a static YAML config, injects secrets from the
/// environment, and maps it onto the core's [`PipelineConfig`].
///
/// This module is the only place where user-supplied YAML is parsed. The
/// YAML-side structs below mirror the file layout; everything past this module
/// works on the strongly-typed core structs.
///
/// # Responsibilities
/// - Parse the YAML file into intermediate structs, filling optional keys with defaults
/// - Convert seconds/milliseconds into `Duration`s (`fragment_timeout_secs: 0` disables the timeout)
/// - Inject the API key from `LLM_SHUTTLE_API_KEY`, which wins over the file
/// - Surface any failure as an `anyhow::Error` naming the file
///
/// The accepted schema is the one in `RawConfig` below; every section but
/// `connection`, `templates` and `output` is optional.
use anyhow::Result;
use llm_shuttle_core::config::{
    ConnectionConfig, ExecutionConfig, OutputConfig, PipelineConfig, RetryPolicy,
};
use llm_shuttle_core::CodeFence;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

/// Environment variable holding the bearer token for the chat endpoint.
pub const API_KEY_ENV: &str = "LLM_SHUTTLE_API_KEY";

/// Loaded CLI configuration: the pipeline settings plus where templates live.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub pipeline: PipelineConfig,
    pub templates: TemplatesSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesSection {
    #[serde(default)]
    pub directives: Option<PathBuf>,
    pub tasks_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ConnectionSection {
    endpoint: String,
    models: Vec<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    connect_timeout_secs: Option<u64>,
    #[serde(default)]
    fragment_timeout_secs: Option<u64>,
    #[serde(default)]
    retry: Option<RetrySection>,
}

#[derive(Debug, Deserialize)]
struct RetrySection {
    max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    initial_backoff_ms: u64,
}

fn default_backoff_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize)]
struct OutputSection {
    root: PathBuf,
    #[serde(default)]
    text_extension: Option<String>,
    #[serde(default)]
    code_extension: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractionSection {
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecutionSection {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    connection: ConnectionSection,
    templates: TemplatesSection,
    output: OutputSection,
    #[serde(default)]
    extraction: ExtractionSection,
    #[serde(default)]
    execution: ExecutionSection,
}

impl RawConfig {
    fn into_cli_config(self, api_key_from_env: Option<String>) -> CliConfig {
        let conn = self.connection;

        let mut connection = ConnectionConfig::new(conn.endpoint);
        connection.api_key = api_key_from_env.or(conn.api_key);
        if let Some(secs) = conn.connect_timeout_secs {
            connection.connect_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = conn.fragment_timeout_secs {
            connection.fragment_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(retry) = conn.retry {
            connection.retry = RetryPolicy {
                max_attempts: retry.max_attempts.max(1),
                initial_backoff: Duration::from_millis(retry.initial_backoff_ms),
            };
        }

        let mut output = OutputConfig::new(self.output.root);
        if let Some(ext) = self.output.text_extension {
            output.text_extension = ext;
        }
        if let Some(ext) = self.output.code_extension {
            output.code_extension = ext;
        }

        let fence = self
            .extraction
            .language
            .map(|tag| CodeFence::language(&tag))
            .unwrap_or_default();

        let mut execution = ExecutionConfig {
            enabled: self.execution.enabled,
            ..ExecutionConfig::default()
        };
        if let Some(secs) = self.execution.timeout_secs {
            execution.timeout = Duration::from_secs(secs);
        }

        CliConfig {
            pipeline: PipelineConfig {
                connection,
                models: conn.models,
                output,
                fence,
                execution,
                task_filter: None,
            },
            templates: self.templates,
        }
    }
}

/// Loads a YAML config file and injects the API key from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML {:?}: {e}", path_ref));
        }
    };

    if raw.connection.models.is_empty() {
        error!(config_path = ?path_ref, "No models configured");
        return Err(anyhow::anyhow!(
            "Config {:?} lists no models under connection.models",
            path_ref
        ));
    }

    let api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
    if api_key.is_some() {
        info!(env = API_KEY_ENV, "API key taken from environment");
    }

    let config = raw.into_cli_config(api_key);
    config.pipeline.trace_loaded();
    Ok(config)
}
