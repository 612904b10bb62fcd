//! The token shuttle: a one-shot reply stream that records what passes through it.
//!
//! [`TokenShuttle`] owns the live fragment stream. Every fragment pulled with
//! [`TokenShuttle::next_fragment`] is appended to the shuttle's buffer before
//! it is handed to the caller. Once the stream has ended (or failed) the
//! shuttle stays exhausted: later pulls return `None`.
//!
//! Code blocks are extracted from a [`Transcript`], never from the live
//! shuttle. The normal way to get one is [`TokenShuttle::drain`], which pulls
//! to the end first. [`TokenShuttle::snapshot_text`] gives the text recorded so
//! far; extracting from a snapshot taken mid-stream yields partial results.

use std::fmt;
use std::time::Duration;

use futures::StreamExt;

use crate::contract::FragmentStream;
use crate::error::ChatError;
use crate::extract::{extract_code_blocks, CodeFence};

/// Append-only text of every fragment received for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    /// Blocks between `fence` markers, in order of appearance.
    ///
    /// Pure function of the current text, so repeated calls agree.
    pub fn extract_code_blocks(&self, fence: &CodeFence) -> Vec<String> {
        extract_code_blocks(&self.text, fence)
    }
}

impl From<String> for Transcript {
    fn from(text: String) -> Self {
        Self { text }
    }
}

impl From<&str> for Transcript {
    fn from(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub struct TokenShuttle {
    source: Option<FragmentStream>,
    transcript: Transcript,
    fragment_timeout: Option<Duration>,
}

impl fmt::Debug for TokenShuttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenShuttle")
            .field("exhausted", &self.is_exhausted())
            .field("received", &self.transcript.len())
            .field("fragment_timeout", &self.fragment_timeout)
            .finish()
    }
}

impl TokenShuttle {
    pub fn new(source: FragmentStream) -> Self {
        Self {
            source: Some(source),
            transcript: Transcript::new(),
            fragment_timeout: None,
        }
    }

    /// Bound the wait for each fragment. `None` waits indefinitely.
    pub fn with_fragment_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fragment_timeout = timeout;
        self
    }

    /// Pull the next fragment, recording it before returning it.
    ///
    /// Returns `None` once the source has ended. A source error (or an idle
    /// timeout) is returned once and leaves the shuttle exhausted.
    pub async fn next_fragment(&mut self) -> Option<Result<String, ChatError>> {
        let source = self.source.as_mut()?;

        let pulled = match self.fragment_timeout {
            Some(limit) => match tokio::time::timeout(limit, source.next()).await {
                Ok(pulled) => pulled,
                Err(_) => Some(Err(ChatError::Timeout(limit))),
            },
            None => source.next().await,
        };

        match pulled {
            Some(Ok(fragment)) => {
                self.transcript.push(&fragment);
                Some(Ok(fragment))
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, received = self.transcript.len(), "Reply stream failed");
                self.source = None;
                Some(Err(e))
            }
            None => {
                tracing::debug!(received = self.transcript.len(), "Reply stream ended");
                self.source = None;
                None
            }
        }
    }

    /// Pull every remaining fragment, passing each to `on_fragment`, and return
    /// the complete transcript.
    ///
    /// Stops at the first error, whether from the source or from the callback.
    pub async fn drain<F, E>(mut self, mut on_fragment: F) -> Result<Transcript, E>
    where
        F: FnMut(&str) -> Result<(), E>,
        E: From<ChatError>,
    {
        while let Some(fragment) = self.next_fragment().await {
            let fragment = fragment?;
            on_fragment(&fragment)?;
        }
        Ok(self.transcript)
    }

    /// Copy of the text recorded so far.
    pub fn snapshot_text(&self) -> String {
        self.transcript.text.clone()
    }

    pub fn is_exhausted(&self) -> bool {
        self.source.is_none()
    }
}
