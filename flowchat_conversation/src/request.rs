//! Mapping from session state to the workflow request contract.

use flowchat_core::{Exchange, FlowError, WorkflowRequest};

/// Render a transcript as `role:text` lines in transcript order.
#[must_use]
pub fn render_history(transcript: &[Exchange]) -> String {
    transcript
        .iter()
        .map(Exchange::history_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds workflow requests. Holds the session-level settings that are
/// not part of the session state, currently just the user id.
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    user_id: Option<String>,
}

impl RequestBuilder {
    #[must_use]
    pub const fn new(user_id: Option<String>) -> Self {
        Self { user_id }
    }

    /// Build the request for `query` against `state`.
    ///
    /// The query is not yet part of the transcript, so `history` only ever
    /// holds completed turns.
    pub fn build(
        &self,
        state: &crate::SessionState,
        query: &str,
    ) -> Result<WorkflowRequest, FlowError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(FlowError::EmptyQuery);
        }

        let options = state.options();
        Ok(WorkflowRequest {
            query: query.to_string(),
            history: render_history(state.transcript()),
            file_object_id: state.file_object_id().map(str::to_string),
            is_rag: options.is_rag,
            system_prompt: options.system_prompt.clone(),
            user_id: self.user_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SessionOption, SessionState};
    use flowchat_core::ErrorKind;

    #[test]
    fn test_empty_state_builds_bare_request() {
        let builder = RequestBuilder::new(Some("user-42".to_string()));
        let request = builder.build(&SessionState::default(), "  What is RAG? ").unwrap();

        assert_eq!(request.query, "What is RAG?");
        assert_eq!(request.history, "");
        assert_eq!(request.file_object_id, None);
        assert!(request.is_rag);
        assert_eq!(request.system_prompt, None);
        assert_eq!(request.user_id.as_deref(), Some("user-42"));
    }

    #[test]
    fn test_history_and_options_are_copied() {
        let mut state = SessionState::default();
        state.append("first question", "first answer");
        state.append("second question", "line one\nline two");
        state.set_file("drive-file-1");
        state.set_option(SessionOption::IsRag(false));
        state.set_option(SessionOption::SystemPrompt(Some("Be terse.".to_string())));

        let request = RequestBuilder::default().build(&state, "third question").unwrap();

        assert_eq!(
            request.history,
            "user:first question\nassistant:first answer\nuser:second question\nassistant:line one\nline two"
        );
        assert_eq!(request.file_object_id.as_deref(), Some("drive-file-1"));
        assert!(!request.is_rag);
        assert_eq!(request.system_prompt.as_deref(), Some("Be terse."));
        assert_eq!(request.user_id, None);
    }

    #[test]
    fn test_blank_query_is_rejected() {
        let builder = RequestBuilder::default();
        for query in ["", "   ", "\n\t"] {
            let err = builder.build(&SessionState::default(), query).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::EmptyQuery);
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let mut state = SessionState::default();
        state.append("a", "b");
        let builder = RequestBuilder::new(Some("u".to_string()));

        assert_eq!(
            builder.build(&state, "c").unwrap(),
            builder.build(&state, "c").unwrap()
        );
    }
}
