//! Classification of streamed chunks into answer text and protocol noise.
//!
//! The rules are data: which event tags are control traffic, where the
//! text lives for content events, which raw payloads are keep-alive noise,
//! and which trailing artifacts to strip from a finished answer. Backends
//! change their event vocabulary, so the table is loaded from configuration.

use std::collections::{HashMap, HashSet};

use flowchat_core::ResponseChunk;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Outcome of classifying one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkClass {
    /// A fragment of the answer text.
    Content(String),
    /// Protocol traffic with no user-visible text.
    Control,
    /// The backend reported a failure inside the stream; carries its message.
    Error(String),
    /// Neither shape matched; carries the reason.
    Unrecognized(String),
}

pub trait ChunkClassifier: Send + Sync {
    fn classify(&self, chunk: &ResponseChunk) -> ChunkClass;

    /// Clean up the accumulated answer once the stream is exhausted.
    fn finalize(&self, text: String) -> String {
        text
    }
}

/// Serializable rule set behind [`NoiseTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseRules {
    /// Regexes matched against the trimmed raw payload; a hit is control traffic.
    #[serde(default = "NoiseRules::default_noise_patterns")]
    pub noise_patterns: Vec<String>,
    /// Event tags that carry no answer text.
    #[serde(default = "NoiseRules::default_control_events")]
    pub control_events: Vec<String>,
    /// Event tags reporting a failure part way through the stream.
    #[serde(default = "NoiseRules::default_error_events")]
    pub error_events: Vec<String>,
    /// Event tag -> JSON pointer of the text fragment.
    #[serde(default = "NoiseRules::default_content_events")]
    pub content_events: HashMap<String, String>,
    /// Regexes removed from the end of the final answer.
    #[serde(default = "NoiseRules::default_trailing_artifacts")]
    pub trailing_artifacts: Vec<String>,
}

impl Default for NoiseRules {
    fn default() -> Self {
        Self {
            noise_patterns: Self::default_noise_patterns(),
            control_events: Self::default_control_events(),
            error_events: Self::default_error_events(),
            content_events: Self::default_content_events(),
            trailing_artifacts: Self::default_trailing_artifacts(),
        }
    }
}

impl NoiseRules {
    fn default_noise_patterns() -> Vec<String> {
        vec![r"^$".to_string(), r"^\[DONE\]$".to_string()]
    }

    fn default_control_events() -> Vec<String> {
        [
            "workflow_started",
            "workflow_finished",
            "node_started",
            "node_finished",
            "iteration_started",
            "iteration_next",
            "iteration_completed",
            "parallel_branch_started",
            "parallel_branch_finished",
            "message_end",
            "message_file",
            "message_replace",
            "tts_message",
            "tts_message_end",
            "agent_thought",
            "ping",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }

    fn default_error_events() -> Vec<String> {
        vec!["error".to_string()]
    }

    fn default_content_events() -> HashMap<String, String> {
        [
            ("text_chunk", "/data/text"),
            ("message", "/answer"),
            ("agent_message", "/answer"),
        ]
        .into_iter()
        .map(|(event, pointer)| (event.to_string(), pointer.to_string()))
        .collect()
    }

    fn default_trailing_artifacts() -> Vec<String> {
        vec![
            r"<\|[A-Za-z0-9_]+\|>".to_string(),
            r"<\|(?:end|eot|im_end)[A-Za-z0-9_]*\|?".to_string(),
        ]
    }
}

/// Table-driven [`ChunkClassifier`].
#[derive(Debug, Clone)]
pub struct NoiseTable {
    noise_patterns: Vec<Regex>,
    control_events: HashSet<String>,
    error_events: HashSet<String>,
    content_events: HashMap<String, String>,
    trailing_artifacts: Vec<Regex>,
}

impl NoiseTable {
    /// Compile a rule set. Trailing artifact patterns are anchored to the end
    /// of the text.
    pub fn from_rules(rules: &NoiseRules) -> Result<Self, regex::Error> {
        let noise_patterns = rules
            .noise_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        let trailing_artifacts = rules
            .trailing_artifacts
            .iter()
            .map(|p| Regex::new(&format!(r"(?:{p})\s*$")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            noise_patterns,
            control_events: rules.control_events.iter().cloned().collect(),
            error_events: rules.error_events.iter().cloned().collect(),
            content_events: rules.content_events.clone(),
            trailing_artifacts,
        })
    }

    fn event_tag(chunk: &ResponseChunk, payload: Option<&Value>) -> Option<String> {
        chunk.event.clone().or_else(|| {
            payload
                .and_then(|v| v.get("event"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    }
}

impl Default for NoiseTable {
    fn default() -> Self {
        Self::from_rules(&NoiseRules::default())
            .unwrap_or_else(|e| unreachable!("built-in noise rules must compile: {e}"))
    }
}

impl ChunkClassifier for NoiseTable {
    fn classify(&self, chunk: &ResponseChunk) -> ChunkClass {
        let data = chunk.data.trim();
        if self.noise_patterns.iter().any(|p| p.is_match(data)) {
            return ChunkClass::Control;
        }

        let payload = serde_json::from_str::<Value>(data).ok();
        let Some(tag) = Self::event_tag(chunk, payload.as_ref()) else {
            return ChunkClass::Unrecognized("chunk has no event tag".to_string());
        };

        if self.error_events.contains(&tag) {
            warn!("Workflow backend sent an error frame: {data}");
            let message = payload
                .as_ref()
                .and_then(|v| v.get("message"))
                .and_then(Value::as_str)
                .map_or_else(|| data.to_string(), str::to_string);
            return ChunkClass::Error(message);
        }
        if self.control_events.contains(&tag) {
            return ChunkClass::Control;
        }

        let Some(pointer) = self.content_events.get(&tag) else {
            return ChunkClass::Unrecognized(format!("unknown event `{tag}`"));
        };

        match payload.as_ref().and_then(|v| v.pointer(pointer)) {
            Some(Value::String(text)) => ChunkClass::Content(text.clone()),
            Some(_) => ChunkClass::Unrecognized(format!("`{tag}` text at {pointer} is not a string")),
            None => ChunkClass::Unrecognized(format!("`{tag}` payload has no text at {pointer}")),
        }
    }

    fn finalize(&self, mut text: String) -> String {
        loop {
            let cut = self
                .trailing_artifacts
                .iter()
                .filter_map(|p| p.find(&text))
                .map(|m| m.start())
                .min();
            match cut {
                Some(start) if start < text.len() => text.truncate(start),
                _ => return text,
            }
        }
    }
}
