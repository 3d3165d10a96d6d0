#![warn(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Conversation turns against a streaming workflow backend.
//!
//! This crate owns everything with sequencing and state in flowchat:
//! the per-session state, the mapping from that state to a workflow
//! request, the reconstruction of a clean answer from a noisy chunk
//! stream, and the turn lifecycle that ties them together.
//!
//! # Key Features
//! - Single-flight turns per session, with reset-aware discard of stale results
//! - Configurable noise table for classifying streamed chunks
//! - Incremental fragments surfaced to the caller while the answer streams
//! - File uploads that attach a blob store reference to the session

mod assembler;
mod classifier;
mod orchestrator;
mod request;
mod session;
mod upload;

#[cfg(test)]
mod proptests;

pub use assembler::{Assembly, StreamAssembler, assemble};
pub use classifier::{ChunkClass, ChunkClassifier, NoiseRules, NoiseTable};
pub use orchestrator::{TurnEvent, TurnOrchestrator, TurnOutcome, TurnPhase};
pub use request::{RequestBuilder, render_history};
pub use session::{Session, SessionOption, SessionOptions, SessionState};
pub use upload::{UploadHandler, UploadReceipt};
