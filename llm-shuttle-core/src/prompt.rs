//! Prompt assembly and the template files it is built from.
//!
//! A run has one directives text (loaded once) and one prompt per task. The
//! text sent to the model is the directives, a newline, then the task prompt.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use mockall::automock;
use tracing::{info, warn};

use crate::error::TemplateError;

/// Directives used when no directives file is configured.
pub const DEFAULT_DIRECTIVES: &str = "Answer with complete, self-contained Rust code. \
Put every source file in its own ```rust fenced block and keep explanations outside the blocks.";

/// Directives plus one task prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptAssembly {
    pub directives: String,
    pub task: String,
}

impl PromptAssembly {
    pub fn new(directives: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            directives: directives.into(),
            task: task.into(),
        }
    }

    pub fn assemble(&self) -> String {
        format!("{}\n{}", self.directives, self.task)
    }
}

/// One unit of work: a named prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub prompt: String,
}

/// Where directives and task prompts come from.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait TemplateSource: Send + Sync {
    fn directives(&self) -> Result<String, TemplateError>;

    /// All tasks, ordered by name.
    fn tasks(&self) -> Result<Vec<Task>, TemplateError>;
}

/// Templates on disk: an optional directives file and a directory of task
/// prompts, one file per task, named by file stem.
#[derive(Debug, Clone)]
pub struct FsTemplates {
    directives: Option<PathBuf>,
    tasks_dir: PathBuf,
}

impl FsTemplates {
    pub fn new(directives: Option<PathBuf>, tasks_dir: impl Into<PathBuf>) -> Self {
        Self {
            directives,
            tasks_dir: tasks_dir.into(),
        }
    }

    pub fn tasks_dir(&self) -> &Path {
        &self.tasks_dir
    }
}

fn read_template(path: &Path) -> Result<String, TemplateError> {
    fs::read_to_string(path).map_err(|source| TemplateError::Read {
        path: path.to_path_buf(),
        source,
    })
}

impl TemplateSource for FsTemplates {
    fn directives(&self) -> Result<String, TemplateError> {
        match &self.directives {
            Some(path) => {
                let text = read_template(path)?;
                info!(path = %path.display(), bytes = text.len(), "Loaded directives");
                Ok(text)
            }
            None => Ok(DEFAULT_DIRECTIVES.to_string()),
        }
    }

    fn tasks(&self) -> Result<Vec<Task>, TemplateError> {
        let list_err = |source| TemplateError::ListTasks {
            path: self.tasks_dir.clone(),
            source,
        };

        let mut tasks = Vec::new();
        let mut sources: HashMap<String, PathBuf> = HashMap::new();
        for entry in fs::read_dir(&self.tasks_dir).map_err(list_err)? {
            let path = entry.map_err(list_err)?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!(path = %path.display(), "Skipping task file with a non UTF-8 name");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if let Some(first) = sources.get(name) {
                warn!(task = name, first = %first.display(), second = %path.display(), "Duplicate task name");
                return Err(TemplateError::DuplicateTask {
                    name: name.to_string(),
                    first: first.clone(),
                    second: path.clone(),
                });
            }
            sources.insert(name.to_string(), path.clone());
            tasks.push(Task {
                name: name.to_string(),
                prompt: read_template(&path)?,
            });
        }

        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        info!(tasks_dir = %self.tasks_dir.display(), count = tasks.len(), "Loaded task prompts");
        Ok(tasks)
    }
}
