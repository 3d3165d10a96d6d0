//! Turn lifecycle: build the request, stream the answer, record the turn.
//!
//! A turn moves `Idle -> Building -> Streaming -> Finalizing -> Idle`, or
//! drops to `Failed` and back to `Idle` on any error. Only one turn runs
//! per session; a failed or discarded turn never touches the transcript.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use flowchat_core::{BackendError, ChunkStream, ErrorKind, FlowError, WorkflowBackend};
use futures::StreamExt;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::assembler::{Assembly, assemble};
use crate::classifier::ChunkClassifier;
use crate::request::RequestBuilder;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Building,
    Streaming,
    Finalizing,
    Failed,
}

/// What the presentation layer sees during a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Fragment(String),
    Finished { final_text: String },
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The turn completed and was appended to the transcript.
    Answered(String),
    /// The session was reset while the turn ran; nothing was recorded.
    Discarded,
}

/// Holds the session's single-flight slot for the duration of a turn and
/// puts the session back to `Idle` however the turn ends.
struct PhaseGuard<'a> {
    session: &'a Session,
}

impl<'a> PhaseGuard<'a> {
    fn acquire(session: &'a Session) -> Result<Self, FlowError> {
        session.try_begin_turn()?;
        Ok(Self { session })
    }

    fn advance(&self, phase: TurnPhase) {
        debug!("Turn phase -> {phase:?}");
        self.session.set_phase(phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.session.set_phase(TurnPhase::Idle);
    }
}

/// Coordinates conversation turns for one session.
pub struct TurnOrchestrator {
    session: Arc<Session>,
    backend: Arc<dyn WorkflowBackend>,
    classifier: Arc<dyn ChunkClassifier>,
    builder: RequestBuilder,
    idle_timeout: Option<Duration>,
}

impl TurnOrchestrator {
    pub fn new(
        session: Arc<Session>,
        backend: Arc<dyn WorkflowBackend>,
        classifier: Arc<dyn ChunkClassifier>,
    ) -> Self {
        Self {
            session,
            backend,
            classifier,
            builder: RequestBuilder::default(),
            idle_timeout: None,
        }
    }

    #[must_use]
    pub fn with_request_builder(mut self, builder: RequestBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Fail the turn if the backend goes quiet for longer than `timeout`.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn phase(&self) -> TurnPhase {
        self.session.phase()
    }

    /// Run one turn for `query`.
    ///
    /// Fragments are handed to `on_event` as they stream in, followed by
    /// exactly one terminal `Finished` or `Failed` event. A turn discarded
    /// because of a reset ends silently.
    pub async fn submit(
        &self,
        query: &str,
        mut on_event: impl FnMut(TurnEvent),
    ) -> Result<TurnOutcome, FlowError> {
        let span = info_span!("turn", session = %self.session.id(), turn = %Uuid::now_v7());
        let result = self.run_turn(query, &mut on_event).instrument(span).await;

        match &result {
            Ok(TurnOutcome::Answered(final_text)) => on_event(TurnEvent::Finished {
                final_text: final_text.clone(),
            }),
            Ok(TurnOutcome::Discarded) => {}
            Err(e) => on_event(TurnEvent::Failed {
                kind: e.kind(),
                message: e.user_message(),
            }),
        }
        result
    }

    async fn run_turn(
        &self,
        query: &str,
        on_event: &mut impl FnMut(TurnEvent),
    ) -> Result<TurnOutcome, FlowError> {
        if query.trim().is_empty() {
            return Err(FlowError::EmptyQuery);
        }

        let guard = PhaseGuard::acquire(&self.session)?;
        let result = self.drive(&guard, query, on_event).await;
        match &result {
            Ok(TurnOutcome::Answered(text)) => {
                info!("Turn completed ({} chars)", text.len());
            }
            Ok(TurnOutcome::Discarded) => {
                info!("Session was reset during the turn, result discarded");
            }
            Err(e) => {
                guard.advance(TurnPhase::Failed);
                warn!("Turn failed: {e}");
            }
        }
        result
    }

    async fn drive(
        &self,
        guard: &PhaseGuard<'_>,
        query: &str,
        on_event: &mut impl FnMut(TurnEvent),
    ) -> Result<TurnOutcome, FlowError> {
        let (state, generation) = self.session.snapshot_with_generation();
        let request = self.builder.build(&state, query)?;
        debug!(
            turns = state.turn_count(),
            has_file = request.file_object_id.is_some(),
            is_rag = request.is_rag,
            "Built workflow request"
        );

        guard.advance(TurnPhase::Streaming);
        let stream = self.backend.submit_streaming(&request).await?;
        let stream = match self.idle_timeout {
            Some(idle) => with_idle_timeout(stream, idle),
            None => stream,
        };

        let session = &self.session;
        let assembly = assemble(self.classifier.as_ref(), stream, |fragment| {
            if session.generation() != generation {
                return ControlFlow::Break(());
            }
            on_event(TurnEvent::Fragment(fragment.to_string()));
            ControlFlow::Continue(())
        })
        .await?;

        let Assembly::Complete(final_text) = assembly else {
            return Ok(TurnOutcome::Discarded);
        };

        guard.advance(TurnPhase::Finalizing);
        if final_text.is_empty() {
            warn!("Workflow backend returned an empty answer");
        }
        if session.append_if_generation(generation, request.query, final_text.clone()) {
            Ok(TurnOutcome::Answered(final_text))
        } else {
            Ok(TurnOutcome::Discarded)
        }
    }
}

/// End the stream with a timeout error if no item arrives within `idle`.
fn with_idle_timeout(stream: ChunkStream, idle: Duration) -> ChunkStream {
    futures::stream::unfold(Some(stream), move |state| async move {
        let mut stream = state?;
        match tokio::time::timeout(idle, stream.next()).await {
            Ok(Some(item)) => Some((item, Some(stream))),
            Ok(None) => None,
            Err(_) => Some((Err(BackendError::idle_timeout(idle)), None)),
        }
    })
    .boxed()
}
