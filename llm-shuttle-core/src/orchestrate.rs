//! High-level pipeline: orchestrates prompt → streamed reply → code blocks on disk.
//!
//! This module drives one "ask the model, extract code, persist artifacts"
//! cycle per task, and a whole run over every configured model and task:
//!   - Resolves and creates the task's output directory
//!   - Assembles the prompt (directives, newline, task prompt) and writes `input.*`
//!   - Streams the reply, echoing every fragment to the console as it arrives
//!   - Writes the complete transcript to `output.*`
//!   - Extracts code blocks, runs each through the [`Compiler`] for diagnostics
//!     and writes it to `CodeBlock.NNN.*`
//!
//! # Major Types
//! - [`TaskReport`]: paths and diagnostics produced by one task
//! - [`RunReport`]: every task report of a run, in execution order
//!
//! # Responsibilities
//! - Fail-fast: an I/O or transport error aborts the current task and the run
//! - Parse diagnostics are reported, never fatal; the block is written before they are
//! - Two models or tasks that would share an output directory are rejected up front
//! - Strictly sequential: one task at a time, one fragment at a time
//!
//! # Error Handling
//! Fatal failures come back as [`OrchestrateError`]; callers log and surface them.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use tracing::{error, info, info_span, warn, Instrument};

use crate::artifacts::{sanitise_component, ArtifactDir};
use crate::chat::fetch_reply;
use crate::config::PipelineConfig;
use crate::contract::{ChatModel, Compiler, ParseOutcome};
use crate::error::OrchestrateError;
use crate::prompt::{PromptAssembly, Task, TemplateSource};

#[derive(Debug)]
pub struct RunReport {
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    pub fn code_block_count(&self) -> usize {
        self.tasks.iter().map(|t| t.code_blocks.len()).sum()
    }
}

#[derive(Debug)]
pub struct TaskReport {
    pub model: String,
    pub task: String,
    pub output_dir: PathBuf,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub code_blocks: Vec<CodeBlockReport>,
}

#[derive(Debug)]
pub struct CodeBlockReport {
    pub index: usize,
    pub path: PathBuf,
    pub outcome: ParseOutcome,
}

fn console_err(e: std::io::Error) -> OrchestrateError {
    OrchestrateError::Console(e)
}

/// Run a single task against a single model.
pub async fn run_task<M, C, W>(
    chat: &M,
    compiler: &C,
    config: &PipelineConfig,
    model: &str,
    directives: &str,
    task: &Task,
    console: &mut W,
) -> Result<TaskReport, OrchestrateError>
where
    M: ChatModel + ?Sized,
    C: Compiler + ?Sized,
    W: Write,
{
    // Step 1: output directory
    let dir = ArtifactDir::resolve(&config.output, model, &task.name);
    dir.create()?;

    // Step 2-3: prompt
    let prompt = PromptAssembly::new(directives, task.prompt.as_str()).assemble();
    let input_path = dir.write_input(&prompt)?;

    // Step 4-5: stream the reply to the console while it is recorded
    let shuttle = fetch_reply(chat, &config.connection, model, &prompt).await?;
    let transcript = shuttle
        .drain(|fragment| {
            console.write_all(fragment.as_bytes()).map_err(console_err)?;
            console.flush().map_err(console_err)
        })
        .await?;
    info!(bytes = transcript.len(), "Reply complete");

    writeln!(console, "\n\n--- transcript ({model} / {}) ---\n{transcript}", task.name)
        .map_err(console_err)?;

    // Step 6: transcript
    let output_path = dir.write_output(transcript.text())?;

    // Step 7: code blocks
    let blocks = transcript.extract_code_blocks(&config.fence);
    if blocks.is_empty() {
        warn!(fence = config.fence.prefix(), "No code blocks in reply");
    }

    let mut code_blocks = Vec::with_capacity(blocks.len());
    for (index, block) in blocks.iter().enumerate() {
        let outcome = compiler.parse(block);
        let path = dir.write_code_block(index, block)?;

        match &outcome {
            ParseOutcome::Parsed { tree } => {
                info!(index, "Code block parsed");
                writeln!(console, "CodeBlock {index:03}: parsed\n{tree}").map_err(console_err)?;
            }
            ParseOutcome::Diagnostics(messages) => {
                warn!(index, diagnostics = messages.len(), "Code block did not parse");
                writeln!(console, "CodeBlock {index:03}: {} diagnostic(s)", messages.len())
                    .map_err(console_err)?;
                for message in messages {
                    writeln!(console, "  {message}").map_err(console_err)?;
                }
            }
        }
        writeln!(console, "wrote {}", path.display()).map_err(console_err)?;
        code_blocks.push(CodeBlockReport {
            index,
            path,
            outcome,
        });
    }

    Ok(TaskReport {
        model: model.to_string(),
        task: task.name.clone(),
        output_dir: dir.path().to_path_buf(),
        input_path,
        output_path,
        code_blocks,
    })
}

/// Fail when two names would share one output directory.
fn ensure_distinct_dirs<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), OrchestrateError> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for name in names {
        let component = sanitise_component(name);
        if let Some(first) = seen.get(&component) {
            error!(kind, first = *first, second = name, component = %component, "[RUN][ERROR] Output directories collide");
            return Err(OrchestrateError::OutputCollision {
                kind,
                first: first.to_string(),
                second: name.to_string(),
                component,
            });
        }
        seen.insert(component, name);
    }
    Ok(())
}

/// Run every task for every configured model, one after another.
///
/// Directives are loaded once. The first fatal error ends the run.
pub async fn run_all<M, C, T, W>(
    chat: &M,
    compiler: &C,
    templates: &T,
    config: &PipelineConfig,
    console: &mut W,
) -> Result<RunReport, OrchestrateError>
where
    M: ChatModel + ?Sized,
    C: Compiler + ?Sized,
    T: TemplateSource + ?Sized,
    W: Write,
{
    info!(models = config.models.len(), "[RUN] Starting pipeline");

    let directives = templates.directives()?;
    let mut tasks = templates.tasks()?;
    if let Some(only) = &config.task_filter {
        tasks.retain(|t| &t.name == only);
    }
    if tasks.is_empty() {
        warn!(filter = ?config.task_filter, "[RUN] No tasks to run");
    }
    ensure_distinct_dirs("model", config.models.iter().map(String::as_str))?;
    ensure_distinct_dirs("task", tasks.iter().map(|t| t.name.as_str()))?;

    let mut reports = Vec::new();
    for model in &config.models {
        for task in &tasks {
            let span = info_span!("task", model = %model, task = %task.name);
            let result = run_task(chat, compiler, config, model, &directives, task, console)
                .instrument(span)
                .await;
            match result {
                Ok(report) => {
                    info!(
                        model = %model,
                        task = %task.name,
                        code_blocks = report.code_blocks.len(),
                        "[RUN] Task complete"
                    );
                    reports.push(report);
                }
                Err(e) => {
                    error!(model = %model, task = %task.name, error = %e, "[RUN][ERROR] Task failed");
                    return Err(e);
                }
            }
        }
    }

    Ok(RunReport { tasks: reports })
}
