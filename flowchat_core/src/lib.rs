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

//! Shared vocabulary of the flowchat workspace: transcript types, the
//! workflow request contract, streamed response chunks, and the two
//! collaborator traits (workflow backend and blob store).

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub mod error;

pub use error::{BackendError, BackendErrorKind, BlobError, BlobErrorKind, ErrorKind, FlowError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a turn. Never mutated after it lands in a transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Exchange {
    pub role: Role,
    pub text: String,
}

impl Exchange {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    /// `role:text`, the line format used in the request history.
    #[must_use]
    pub fn history_line(&self) -> String {
        format!("{}:{}", self.role, self.text)
    }
}

/// Input contract of the workflow backend for one turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowRequest {
    pub query: String,
    pub history: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_object_id: Option<String>,
    pub is_rag: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Raw unit delivered by the streaming transport.
///
/// `event` is the transport-level event tag when the transport has one
/// (the SSE `event:` field); `data` is the untouched payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseChunk {
    pub event: Option<String>,
    pub data: String,
}

impl ResponseChunk {
    #[must_use]
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    #[must_use]
    pub fn with_event(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
        }
    }
}

/// Lazy sequence of chunks produced by a streaming submission.
pub type ChunkStream = BoxStream<'static, Result<ResponseChunk, BackendError>>;

#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    /// Start a streaming run. Errors returned here happen before any chunk
    /// was produced; errors inside the stream happen mid-answer.
    async fn submit_streaming(&self, request: &WorkflowRequest) -> Result<ChunkStream, BackendError>;
}

/// What the blob store reports about a freshly stored object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredObject {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_link: Option<String>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        prefix: Option<&str>,
    ) -> Result<StoredObject, BlobError>;

    async fn try_set_public(&self, object_id: &str) -> Result<(), BlobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_line_uses_lowercase_role() {
        assert_eq!(Exchange::user("hi").history_line(), "user:hi");
        assert_eq!(
            Exchange::assistant("a:b").history_line(),
            "assistant:a:b"
        );
    }

    #[test]
    fn absent_file_reference_is_omitted_on_the_wire() {
        let request = WorkflowRequest {
            query: "q".to_string(),
            history: String::new(),
            file_object_id: None,
            is_rag: true,
            system_prompt: None,
            user_id: Some("u-1".to_string()),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("file_object_id").is_none());
        assert!(value.get("system_prompt").is_none());
        assert_eq!(value["is_rag"], true);
        assert_eq!(value["user_id"], "u-1");
    }
}
