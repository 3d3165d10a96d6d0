#![deny(
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

//! HTTP adapters for the flowchat collaborators: the streaming workflow
//! backend and the Drive-style blob store.

pub mod drive;
pub mod retry;
pub mod sse;
pub mod workflow;

pub use drive::DriveStore;
pub use retry::{backoff_delays, retry_with_backoff};
pub use sse::{SseDecoder, decode_stream};
pub use workflow::WorkflowClient;
