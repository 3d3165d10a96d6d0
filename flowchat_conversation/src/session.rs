//! Session state for one interactive conversation.
//!
//! `SessionState` is the plain record (transcript, file reference,
//! options). `Session` is the shared cell the orchestrator, the upload
//! handler and the presentation layer all hold; every mutation goes
//! through a single lock acquisition so no reader ever sees half a reset.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use flowchat_core::{Exchange, FlowError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::orchestrator::TurnPhase;

/// Per-session request options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub is_rag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            is_rag: true,
            system_prompt: None,
        }
    }
}

/// A single option update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOption {
    IsRag(bool),
    SystemPrompt(Option<String>),
}

impl SessionOption {
    /// Parse a `key value` pair as typed by a user or read from a form.
    ///
    /// An empty system prompt clears it.
    pub fn parse(key: &str, value: &str) -> Result<Self, FlowError> {
        match key.trim() {
            "is_rag" | "isRag" | "rag" => parse_flag(value)
                .map(Self::IsRag)
                .ok_or_else(|| FlowError::invalid_option(key, format!("`{value}` is not a boolean"))),
            "system_prompt" | "systemPrompt" => {
                let value = value.trim();
                Ok(Self::SystemPrompt(
                    (!value.is_empty()).then(|| value.to_string()),
                ))
            }
            _ => Err(FlowError::invalid_option(key, "unknown option")),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Transcript, file reference and options of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    transcript: Vec<Exchange>,
    file_object_id: Option<String>,
    options: SessionOptions,
    defaults: SessionOptions,
}

impl SessionState {
    /// Create an empty state whose options (and reset target) are `defaults`.
    #[must_use]
    pub fn new(defaults: SessionOptions) -> Self {
        Self {
            transcript: Vec::new(),
            file_object_id: None,
            options: defaults.clone(),
            defaults,
        }
    }

    #[must_use]
    pub fn transcript(&self) -> &[Exchange] {
        &self.transcript
    }

    #[must_use]
    pub fn file_object_id(&self) -> Option<&str> {
        self.file_object_id.as_deref()
    }

    #[must_use]
    pub const fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Number of completed turns.
    #[must_use]
    pub const fn turn_count(&self) -> usize {
        self.transcript.len() / 2
    }

    /// Record a completed turn: the user exchange, then the assistant one.
    pub fn append(&mut self, user_text: impl Into<String>, assistant_text: impl Into<String>) {
        self.transcript.push(Exchange::user(user_text));
        self.transcript.push(Exchange::assistant(assistant_text));
    }

    pub fn set_file(&mut self, object_id: impl Into<String>) {
        self.file_object_id = Some(object_id.into());
    }

    pub fn set_option(&mut self, option: SessionOption) {
        match option {
            SessionOption::IsRag(is_rag) => self.options.is_rag = is_rag,
            SessionOption::SystemPrompt(prompt) => self.options.system_prompt = prompt,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.defaults.clone());
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    generation: u64,
    phase: TurnPhase,
}

/// Shared, lock-guarded session.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    inner: Mutex<Inner>,
}

impl Session {
    #[must_use]
    pub fn new(defaults: SessionOptions) -> Self {
        let id = Uuid::now_v7();
        info!("Creating session: {id}");
        Self {
            id,
            created_at: Utc::now(),
            inner: Mutex::new(Inner {
                state: SessionState::new(defaults),
                generation: 0,
                phase: TurnPhase::Idle,
            }),
        }
    }

    #[must_use]
    pub fn shared(defaults: SessionOptions) -> Arc<Self> {
        Arc::new(Self::new(defaults))
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves `Inner` consistent, so a poisoned
        // lock still guards valid data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.lock().state.clone()
    }

    /// Copy of the current state together with its generation.
    #[must_use]
    pub fn snapshot_with_generation(&self) -> (SessionState, u64) {
        let inner = self.lock();
        (inner.state.clone(), inner.generation)
    }

    /// Bumped by every reset.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    #[must_use]
    pub fn phase(&self) -> TurnPhase {
        self.lock().phase
    }

    pub fn append(&self, user_text: impl Into<String>, assistant_text: impl Into<String>) {
        self.lock().state.append(user_text, assistant_text);
    }

    /// Append only if no reset happened since `generation` was observed.
    /// Returns whether the turn was recorded.
    pub fn append_if_generation(
        &self,
        generation: u64,
        user_text: impl Into<String>,
        assistant_text: impl Into<String>,
    ) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.state.append(user_text, assistant_text);
        true
    }

    pub fn set_file(&self, object_id: impl Into<String>) {
        let object_id = object_id.into();
        debug!("Session {} now references file {object_id}", self.id);
        self.lock().state.set_file(object_id);
    }

    pub fn set_option(&self, option: SessionOption) {
        debug!("Session {} option update: {option:?}", self.id);
        self.lock().state.set_option(option);
    }

    /// Parse and apply a `key value` option update.
    pub fn set_option_str(&self, key: &str, value: &str) -> Result<(), FlowError> {
        self.set_option(SessionOption::parse(key, value)?);
        Ok(())
    }

    /// Clear transcript, file reference and options in one step.
    ///
    /// A turn that started before the reset will not write its result.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state.reset();
        inner.generation += 1;
        info!(
            "Session {} reset (generation {})",
            self.id, inner.generation
        );
    }

    /// Move from `Idle` to `Building`, or report that a turn is running.
    pub(crate) fn try_begin_turn(&self) -> Result<(), FlowError> {
        let mut inner = self.lock();
        if inner.phase != TurnPhase::Idle {
            return Err(FlowError::TurnInFlight);
        }
        inner.phase = TurnPhase::Building;
        Ok(())
    }

    pub(crate) fn set_phase(&self, phase: TurnPhase) {
        self.lock().phase = phase;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowchat_core::{ErrorKind, Role};

    #[test]
    fn test_new_state_is_empty_with_defaults() {
        let state = SessionState::default();

        assert!(state.transcript().is_empty());
        assert_eq!(state.file_object_id(), None);
        assert!(state.options().is_rag);
        assert_eq!(state.options().system_prompt, None);
    }

    #[test]
    fn test_append_keeps_user_then_assistant_order() {
        let mut state = SessionState::default();
        state.append("hi", "hello");
        state.append("hi", "hello");

        let roles: Vec<Role> = state.transcript().iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(state.turn_count(), 2);
    }

    #[test]
    fn test_set_file_leaves_transcript_and_options() {
        let mut state = SessionState::default();
        state.append("q", "a");
        state.set_option(SessionOption::IsRag(false));

        state.set_file("obj-1");
        state.set_file("obj-2");

        assert_eq!(state.file_object_id(), Some("obj-2"));
        assert_eq!(state.transcript().len(), 2);
        assert!(!state.options().is_rag);
    }

    #[test]
    fn test_reset_restores_configured_defaults() {
        let defaults = SessionOptions {
            is_rag: false,
            system_prompt: Some("Be brief.".to_string()),
        };
        let mut state = SessionState::new(defaults.clone());
        state.append("q", "a");
        state.set_file("obj");
        state.set_option(SessionOption::SystemPrompt(None));
        state.set_option(SessionOption::IsRag(true));

        state.reset();

        assert_eq!(state, SessionState::new(defaults));
    }

    #[test]
    fn test_option_parsing() {
        assert_eq!(
            SessionOption::parse("is_rag", "off").unwrap(),
            SessionOption::IsRag(false)
        );
        assert_eq!(
            SessionOption::parse("isRag", "TRUE").unwrap(),
            SessionOption::IsRag(true)
        );
        assert_eq!(
            SessionOption::parse("system_prompt", "  Answer in Japanese ").unwrap(),
            SessionOption::SystemPrompt(Some("Answer in Japanese".to_string()))
        );
        assert_eq!(
            SessionOption::parse("system_prompt", "").unwrap(),
            SessionOption::SystemPrompt(None)
        );

        let unknown = SessionOption::parse("temperature", "0.2").unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::InvalidOption);
        assert!(unknown.kind().is_configuration());

        let not_bool = SessionOption::parse("rag", "maybe").unwrap_err();
        assert_eq!(not_bool.kind(), ErrorKind::InvalidOption);
    }

    #[test]
    fn test_session_reset_bumps_generation() {
        let session = Session::default();
        session.append("q", "a");
        session.set_file("obj");
        let before = session.generation();
        let started = session.created_at();

        session.reset();

        assert_eq!(session.created_at(), started);
        assert_eq!(session.generation(), before + 1);
        assert_eq!(session.snapshot(), SessionState::default());
        assert!(!session.append_if_generation(before, "late", "answer"));
        assert!(session.snapshot().transcript().is_empty());
        assert!(session.append_if_generation(before + 1, "q2", "a2"));
        assert_eq!(session.snapshot().turn_count(), 1);
    }

    #[test]
    fn test_single_flight_gate() {
        let session = Session::default();
        session.try_begin_turn().unwrap();
        assert_eq!(session.phase(), TurnPhase::Building);
        assert_eq!(
            session.try_begin_turn().unwrap_err().kind(),
            ErrorKind::TurnInFlight
        );
        session.set_phase(TurnPhase::Idle);
        assert!(session.try_begin_turn().is_ok());
    }
}
