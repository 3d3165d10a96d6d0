//! Reconstruction of the final answer from a chunk stream.

use std::ops::ControlFlow;

use flowchat_core::{BackendError, FlowError, ResponseChunk};
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::classifier::{ChunkClass, ChunkClassifier};

const MAX_REPORTED_PAYLOAD: usize = 120;

/// Single-pass accumulator for one response.
pub struct StreamAssembler<'a> {
    classifier: &'a dyn ChunkClassifier,
    text: String,
    content_chunks: usize,
    control_chunks: usize,
}

impl<'a> StreamAssembler<'a> {
    #[must_use]
    pub fn new(classifier: &'a dyn ChunkClassifier) -> Self {
        Self {
            classifier,
            text: String::new(),
            content_chunks: 0,
            control_chunks: 0,
        }
    }

    /// Feed one chunk. Returns the text fragment to surface, if any.
    pub fn push(&mut self, chunk: &ResponseChunk) -> Result<Option<String>, FlowError> {
        match self.classifier.classify(chunk) {
            ChunkClass::Content(fragment) => {
                self.content_chunks += 1;
                if fragment.is_empty() {
                    return Ok(None);
                }
                self.text.push_str(&fragment);
                Ok(Some(fragment))
            }
            ChunkClass::Control => {
                self.control_chunks += 1;
                Ok(None)
            }
            ChunkClass::Error(message) => Err(FlowError::Backend(BackendError::backend(format!(
                "workflow failed mid-stream: {message}"
            )))),
            ChunkClass::Unrecognized(reason) => {
                let payload: String = chunk.data.chars().take(MAX_REPORTED_PAYLOAD).collect();
                Err(FlowError::UnrecognizedChunk(format!("{reason}: {payload}")))
            }
        }
    }

    #[must_use]
    pub fn finish(self) -> String {
        debug!(
            content_chunks = self.content_chunks,
            control_chunks = self.control_chunks,
            "Stream exhausted"
        );
        self.classifier.finalize(self.text)
    }
}

/// Result of driving a stream to its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    /// The stream was exhausted; holds the final answer.
    Complete(String),
    /// The fragment callback asked to stop before the end.
    Stopped,
}

/// Drive `chunks` to completion, handing every text fragment to
/// `on_fragment` as soon as it arrives.
///
/// Transport errors inside the stream and unrecognized chunks end the
/// assembly with an error; nothing accumulated so far is returned.
pub async fn assemble<S, F>(
    classifier: &dyn ChunkClassifier,
    mut chunks: S,
    mut on_fragment: F,
) -> Result<Assembly, FlowError>
where
    S: Stream<Item = Result<ResponseChunk, BackendError>> + Unpin,
    F: FnMut(&str) -> ControlFlow<()>,
{
    let mut assembler = StreamAssembler::new(classifier);

    while let Some(item) = chunks.next().await {
        let chunk = item?;
        let Some(fragment) = assembler.push(&chunk)? else {
            continue;
        };
        if on_fragment(&fragment).is_break() {
            return Ok(Assembly::Stopped);
        }
    }

    Ok(Assembly::Complete(assembler.finish()))
}
