//! Output directory layout and artifact writes.
//!
//! Each (model, task) pair gets `<root>/<model>/<task>/` containing
//! `input.<ext>`, `output.<ext>` and `CodeBlock.<NNN>.<ext>`. Writes overwrite
//! whatever is there; there is no locking or atomic rename.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::config::OutputConfig;
use crate::error::OrchestrateError;

/// Make an identifier safe to use as a single path component.
pub fn sanitise_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

pub fn code_block_file_name(index: usize, extension: &str) -> String {
    format!("CodeBlock.{index:03}.{extension}")
}

/// The resolved output directory of one task.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    path: PathBuf,
    text_extension: String,
    code_extension: String,
}

impl ArtifactDir {
    pub fn resolve(output: &OutputConfig, model: &str, task: &str) -> Self {
        let path = output
            .root
            .join(sanitise_component(model))
            .join(sanitise_component(task));
        Self {
            path,
            text_extension: output.text_extension.clone(),
            code_extension: output.code_extension.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn create(&self) -> Result<(), OrchestrateError> {
        fs::create_dir_all(&self.path).map_err(|source| {
            error!(error = %source, path = %self.path.display(), "Failed to create output directory");
            OrchestrateError::CreateDir {
                path: self.path.clone(),
                source,
            }
        })?;
        debug!(path = %self.path.display(), "Output directory ready");
        Ok(())
    }

    pub fn input_path(&self) -> PathBuf {
        self.path.join(format!("input.{}", self.text_extension))
    }

    pub fn output_path(&self) -> PathBuf {
        self.path.join(format!("output.{}", self.text_extension))
    }

    pub fn code_block_path(&self, index: usize) -> PathBuf {
        self.path.join(code_block_file_name(index, &self.code_extension))
    }

    pub fn write_input(&self, prompt: &str) -> Result<PathBuf, OrchestrateError> {
        write_artifact(self.input_path(), prompt)
    }

    pub fn write_output(&self, transcript: &str) -> Result<PathBuf, OrchestrateError> {
        write_artifact(self.output_path(), transcript)
    }

    pub fn write_code_block(&self, index: usize, block: &str) -> Result<PathBuf, OrchestrateError> {
        write_artifact(self.code_block_path(index), block)
    }
}

fn write_artifact(path: PathBuf, contents: &str) -> Result<PathBuf, OrchestrateError> {
    match fs::write(&path, contents) {
        Ok(()) => {
            info!(path = %path.display(), bytes = contents.len(), "Wrote artifact");
            Ok(path)
        }
        Err(source) => {
            error!(error = %source, path = %path.display(), "Failed to write artifact");
            Err(OrchestrateError::Write { path, source })
        }
    }
}
