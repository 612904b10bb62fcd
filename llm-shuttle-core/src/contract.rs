//! # contract: the seams of the shuttle pipeline
//!
//! This module defines the traits the orchestrator talks to, plus the plain
//! data types that cross them:
//!
//! - [`ChatModel`]: anything that turns a chat request into a stream of reply
//!   fragments (the OpenAI-compatible client, the code-execution middleware,
//!   or a mock).
//! - [`Compiler`]: best-effort parse and pretty-print of a code block, used for
//!   diagnostics only.
//! - [`CodeRunner`]: executes a code block and renders the outcome as text.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`, so tests can script replies and
//!   diagnostics without a network or a toolchain. The mocks are exported
//!   under the `test-export-mocks` feature for integration tests.

use async_trait::async_trait;
use futures::stream::BoxStream;
use mockall::automock;

use crate::error::ChatError;

/// The one-shot stream of reply fragments produced by a [`ChatModel`].
pub type FragmentStream = BoxStream<'static, Result<String, ChatError>>;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat message. Content is optional so "no content" stays representable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
        }
    }
}

/// Everything a [`ChatModel`] needs for one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// Model identifier as understood by the endpoint.
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// Source of streamed chat replies.
///
/// Implementations return as soon as the reply has started; fragments are
/// pulled lazily from the returned stream.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_reply(&self, request: ChatRequest) -> Result<FragmentStream, ChatError>;
}

/// Result of a diagnostic parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The block parsed; `tree` is a pretty-printed outline for logging.
    Parsed { tree: String },
    /// The block did not parse; one entry per diagnostic.
    Diagnostics(Vec<String>),
}

impl ParseOutcome {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ParseOutcome::Parsed { .. })
    }
}

/// Parse-and-pretty-print collaborator. Never blocks persistence of a block.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Compiler: Send + Sync {
    fn parse(&self, source: &str) -> ParseOutcome;
}

/// Code-execution collaborator used by the middleware.
///
/// Failures (compile errors, non-zero exits, timeouts) are rendered into the
/// returned text rather than raised.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, source: String) -> String;
}
