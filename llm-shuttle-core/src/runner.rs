//! Compile-and-run collaborator backed by `rustc`.
//!
//! Each snippet gets its own scratch directory: the source is written to
//! `main.rs`, compiled into a binary, and the binary is executed. Compile and
//! run each get the configured timeout. Every outcome, success or not, comes
//! back as text.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::contract::CodeRunner;

pub struct RustcRunner {
    rustc: PathBuf,
    edition: String,
    timeout: Duration,
}

impl RustcRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            rustc: PathBuf::from("rustc"),
            edition: "2021".to_string(),
            timeout,
        }
    }

    /// Use a specific compiler binary instead of `rustc` from `PATH`.
    pub fn with_rustc(mut self, rustc: impl Into<PathBuf>) -> Self {
        self.rustc = rustc.into();
        self
    }

    async fn execute(&self, mut command: Command, what: &str) -> Result<Output, String> {
        command.kill_on_drop(true);
        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(format!("failed to start {what}: {e}")),
            Err(_) => Err(format!("{what} timed out after {:?}", self.timeout)),
        }
    }

    async fn compile(&self, source: &Path, binary: &Path) -> Result<(), String> {
        let mut command = Command::new(&self.rustc);
        command
            .arg("--edition")
            .arg(&self.edition)
            .arg("-o")
            .arg(binary)
            .arg(source);

        let output = self.execute(command, "rustc").await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(format!(
                "compilation failed:\n{}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }

    async fn compile_and_run(&self, source: &str) -> Result<String, String> {
        let scratch = tempfile::tempdir().map_err(|e| format!("failed to create scratch dir: {e}"))?;
        let source_path = scratch.path().join("main.rs");
        let binary = scratch
            .path()
            .join(format!("snippet{}", std::env::consts::EXE_SUFFIX));

        tokio::fs::write(&source_path, source)
            .await
            .map_err(|e| format!("failed to write snippet: {e}"))?;

        self.compile(&source_path, &binary).await?;

        let output = self.execute(Command::new(&binary), "snippet").await?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            Err(format!(
                "snippet exited with {}:\nstdout:\n{}\nstderr:\n{}",
                output.status,
                stdout,
                String::from_utf8_lossy(&output.stderr).trim_end()
            ))
        }
    }
}

#[async_trait]
impl CodeRunner for RustcRunner {
    async fn run(&self, source: String) -> String {
        let start = Instant::now();
        match self.compile_and_run(&source).await {
            Ok(stdout) => {
                debug!(elapsed = ?start.elapsed(), "Snippet ran successfully");
                stdout
            }
            Err(diagnostic) => {
                warn!(elapsed = ?start.elapsed(), "Snippet did not run cleanly");
                diagnostic
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_program_and_returns_stdout() {
        let runner = RustcRunner::new(Duration::from_secs(120));
        let out = runner
            .run("fn main() { println!(\"hello from snippet\"); }".to_string())
            .await;
        assert_eq!(out, "hello from snippet");
    }

    #[tokio::test]
    async fn compile_errors_are_returned_as_text() {
        let runner = RustcRunner::new(Duration::from_secs(120));
        let out = runner.run("fn main() { let x: u32 = \"no\"; }".to_string()).await;
        assert!(out.starts_with("compilation failed"), "got: {out}");
        assert!(out.contains("error"));
    }

    #[tokio::test]
    async fn failing_program_reports_stdout_and_stderr_separately() {
        let runner = RustcRunner::new(Duration::from_secs(120));
        let out = runner
            .run(
                "fn main() { println!(\"to out\"); eprintln!(\"to err\"); std::process::exit(3); }"
                    .to_string(),
            )
            .await;
        assert!(out.starts_with("snippet exited with"), "got: {out}");
        assert!(out.contains("stdout:\nto out\nstderr:\nto err"), "got: {out}");
    }

    #[tokio::test]
    async fn missing_compiler_is_reported() {
        let runner =
            RustcRunner::new(Duration::from_secs(5)).with_rustc("/nonexistent/rustc-binary");
        let out = runner.run("fn main() {}".to_string()).await;
        assert!(out.starts_with("failed to start rustc"), "got: {out}");
    }
}
