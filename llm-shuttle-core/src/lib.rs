#![doc = "llm-shuttle-core: core pipeline library for llm-shuttle."]

//! This crate holds every piece of the shuttle pipeline: the streaming reply
//! source and its transcript, code-block extraction, prompt assembly, the
//! OpenAI-compatible chat client, the code-execution middleware and the
//! orchestrator that persists prompts, transcripts and code blocks.
//!
//! # Usage
//! Add this as a dependency for anything that needs to drive a task end to end
//! or reuse a single stage (for example re-extracting blocks from a saved
//! transcript).

pub mod artifacts;
pub mod chat;
pub mod compiler;
pub mod config;
pub mod contract;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod orchestrate;
pub mod prompt;
pub mod runner;
pub mod shuttle;
pub mod sse;

pub use extract::{extract_code_blocks, CodeFence};
pub use shuttle::{TokenShuttle, Transcript};
