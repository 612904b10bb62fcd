//! Code-block extraction from accumulated reply text.
//!
//! A block is whatever sits between a literal prefix marker and the next
//! literal suffix marker. Matching is non-overlapping and left to right; a
//! prefix with no suffix after it yields nothing. A suffix marker that appears
//! inside a block (for example a fence inside a string literal) closes the
//! block early.

use regex::Regex;

/// The fence marker used by markdown code blocks.
pub const FENCE: &str = "```";

/// A literal prefix/suffix marker pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFence {
    prefix: String,
    suffix: String,
}

impl CodeFence {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Markdown fence with a language tag, e.g. `` ```rust `` … `` ``` ``.
    pub fn language(tag: &str) -> Self {
        Self::new(format!("{FENCE}{tag}"), FENCE)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    fn pattern(&self) -> Result<Regex, regex::Error> {
        Regex::new(&format!(
            "(?s){}(.*?){}",
            regex::escape(&self.prefix),
            regex::escape(&self.suffix)
        ))
    }
}

impl Default for CodeFence {
    fn default() -> Self {
        Self::language("rust")
    }
}

/// Returns every block between `fence` markers in `text`, trimmed, in order.
pub fn extract_code_blocks(text: &str, fence: &CodeFence) -> Vec<String> {
    let pattern = match fence.pattern() {
        Ok(pattern) => pattern,
        Err(e) => {
            tracing::warn!(error = %e, prefix = fence.prefix(), "Could not build code fence pattern");
            return Vec::new();
        }
    };

    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|body| body.as_str().trim().to_string())
        .collect()
}
