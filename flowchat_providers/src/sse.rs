//! Server-sent events decoding.
//!
//! Bytes arrive in arbitrary pieces: a line, a UTF-8 sequence or a `\r\n`
//! pair may be split across network reads. Only complete lines are
//! decoded, so none of those splits are visible to the caller.

use std::collections::VecDeque;
use std::fmt::Display;

use flowchat_core::{BackendError, ChunkStream, ResponseChunk};
use futures::{Stream, StreamExt};

/// Incremental SSE parser producing one [`ResponseChunk`] per event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every event completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ResponseChunk> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.process_line(&line[..pos]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush an event left open when the body ended without a blank line.
    pub fn finish(&mut self) -> Option<ResponseChunk> {
        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            if let Some(event) = self.process_line(&rest) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, raw: &[u8]) -> Option<ResponseChunk> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);

        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (&*line, ""),
        };
        match field {
            "event" => self.event = (!value.is_empty()).then(|| value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id and retry carry nothing we use
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<ResponseChunk> {
        if self.data.is_empty() && self.event.is_none() {
            return None;
        }
        Some(ResponseChunk {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

struct DecodeState<B, E> {
    bytes: futures::stream::BoxStream<'static, Result<B, E>>,
    decoder: SseDecoder,
    ready: VecDeque<ResponseChunk>,
    finished: bool,
}

/// Turn a response body into a lazy stream of chunks.
///
/// A read error ends the stream with a retryable network error.
pub fn decode_stream<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        bytes: bytes.boxed(),
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.ready.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.feed(bytes.as_ref());
                    state.ready.extend(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    let error = BackendError::network(format!("response stream interrupted: {e}"));
                    return Some((Err(error), state));
                }
                None => {
                    state.finished = true;
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}
