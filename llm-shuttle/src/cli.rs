/// # llm-shuttle CLI Interface (Module)
///
/// Command parsing and the async entrypoint for the `llm-shuttle` binary.
///
/// All pipeline logic (streaming, extraction, artifact layout) lives in the
/// [`llm-shuttle-core`] crate; this module only wires configuration and
/// collaborators together and reports the outcome.
///
/// ## Commands
/// - `run`: ask every configured model to solve every task, streaming replies to
///   stdout and writing artifacts under the output root.
/// - `extract`: re-extract the code blocks of a saved transcript, offline.
///
/// ## How To Use
/// - From the shell: `llm-shuttle --help`.
/// - From tests: call [`run`] with a constructed [`Cli`].
///
/// [`llm-shuttle-core`]: ../../llm-shuttle-core/
use crate::load_config::load_config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use llm_shuttle_core::chat::OpenAiCompatibleClient;
use llm_shuttle_core::compiler::SynCompiler;
use llm_shuttle_core::contract::ChatModel;
use llm_shuttle_core::middleware::CodeExecutionMiddleware;
use llm_shuttle_core::orchestrate::run_all;
use llm_shuttle_core::prompt::FsTemplates;
use llm_shuttle_core::runner::RustcRunner;
use llm_shuttle_core::{CodeFence, Transcript};
use std::io::Write;
use std::path::PathBuf;

/// CLI for llm-shuttle: ask a model for code and keep what it writes.
#[derive(Parser)]
#[clap(
    name = "llm-shuttle",
    version,
    about = "Stream code replies from an OpenAI-compatible model and persist the code blocks"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every task against every configured model
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Run only the task with this name
        #[clap(long)]
        task: Option<String>,
    },
    /// Print the code blocks of a saved transcript
    Extract {
        /// Path to a transcript, e.g. an `output.md` written by `run`
        #[clap(long)]
        transcript: PathBuf,
        /// Language tag after the opening fence
        #[clap(long, default_value = "rust")]
        language: String,
    },
}

/// Async CLI entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run { config, task } => run_pipeline(config, task).await,
        Commands::Extract {
            transcript,
            language,
        } => extract(transcript, &language),
    }
}

async fn run_pipeline(config_path: PathBuf, task: Option<String>) -> Result<()> {
    let mut config = load_config(&config_path)?;
    config.pipeline.task_filter = task;
    tracing::info!(command = "run", "Starting pipeline");

    let client = OpenAiCompatibleClient::new(&config.pipeline.connection)
        .context("Failed to construct chat client")?;
    let chat: Box<dyn ChatModel> = if config.pipeline.execution.enabled {
        tracing::info!(
            timeout = ?config.pipeline.execution.timeout,
            "Code execution middleware enabled"
        );
        Box::new(
            CodeExecutionMiddleware::new(
                client,
                RustcRunner::new(config.pipeline.execution.timeout),
            )
            .with_fence(config.pipeline.fence.clone()),
        )
    } else {
        Box::new(client)
    };

    let templates = FsTemplates::new(config.templates.directives, config.templates.tasks_dir);
    let stdout = std::io::stdout();
    let mut console = stdout.lock();

    match run_all(
        chat.as_ref(),
        &SynCompiler,
        &templates,
        &config.pipeline,
        &mut console,
    )
    .await
    {
        Ok(report) => {
            tracing::info!(
                command = "run",
                tasks = report.tasks.len(),
                code_blocks = report.code_block_count(),
                "Pipeline complete"
            );
            writeln!(
                console,
                "\nCompleted {} task(s), {} code block(s) written.",
                report.tasks.len(),
                report.code_block_count()
            )?;
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = "run", error = %e, "Pipeline failed");
            Err(anyhow::Error::new(e).context("Pipeline failed"))
        }
    }
}

fn extract(path: PathBuf, language: &str) -> Result<()> {
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read transcript {:?}", path))?;
    let transcript = Transcript::from(text);
    let blocks = transcript.extract_code_blocks(&CodeFence::language(language));
    tracing::info!(command = "extract", transcript = ?path, blocks = blocks.len(), "Extracted code blocks");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (index, block) in blocks.iter().enumerate() {
        writeln!(out, "--- CodeBlock {index:03} ---\n{block}")?;
    }
    Ok(())
}
