//! Code-execution middleware for any [`ChatModel`].
//!
//! Before asking the wrapped model, the middleware looks at the last message
//! of the request. If it holds fenced code blocks in the configured language,
//! each block goes to the [`CodeRunner`] instead, and the runner outputs
//! (joined by newlines) become the whole reply. Anything else, including an
//! empty conversation or a message without content, is passed through.

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use tracing::{debug, info};

use crate::contract::{ChatMessage, ChatModel, ChatRequest, CodeRunner, FragmentStream};
use crate::error::ChatError;
use crate::extract::{extract_code_blocks, CodeFence};

pub struct CodeExecutionMiddleware<M, R> {
    inner: M,
    runner: R,
    fence: CodeFence,
}

impl<M, R> CodeExecutionMiddleware<M, R> {
    pub fn new(inner: M, runner: R) -> Self {
        Self {
            inner,
            runner,
            fence: CodeFence::default(),
        }
    }

    pub fn with_fence(mut self, fence: CodeFence) -> Self {
        self.fence = fence;
        self
    }

    /// Blocks to execute, or `None` when the request should reach the model.
    fn executable_blocks(&self, messages: &[ChatMessage]) -> Option<Vec<String>> {
        let content = messages.last()?.content.as_deref()?;
        let blocks = extract_code_blocks(content, &self.fence);
        if blocks.is_empty() {
            None
        } else {
            Some(blocks)
        }
    }
}

#[async_trait]
impl<M, R> ChatModel for CodeExecutionMiddleware<M, R>
where
    M: ChatModel,
    R: CodeRunner,
{
    async fn stream_reply(&self, request: ChatRequest) -> Result<FragmentStream, ChatError> {
        let Some(blocks) = self.executable_blocks(&request.messages) else {
            debug!(model = %request.model, "No executable blocks, forwarding to model");
            return self.inner.stream_reply(request).await;
        };

        info!(blocks = blocks.len(), fence = self.fence.prefix(), "Executing code blocks instead of asking the model");
        let mut results = Vec::with_capacity(blocks.len());
        for block in blocks {
            results.push(self.runner.run(block).await);
        }
        let reply = results.join("\n");
        Ok(stream::once(async move { Ok(reply) }).boxed())
    }
}
