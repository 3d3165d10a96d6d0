//! Property tests for session state and request building.

use proptest::prelude::*;

use crate::request::{RequestBuilder, render_history};
use crate::session::{SessionOption, SessionOptions, SessionState};
use flowchat_core::Role;

#[derive(Debug, Clone)]
enum Op {
    Append(String, String),
    SetFile(String),
    SetRag(bool),
    SetPrompt(Option<String>),
    Reset,
}

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 :,.\n]{0,24}"
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (arb_text(), arb_text()).prop_map(|(u, a)| Op::Append(u, a)),
        1 => "[a-z0-9-]{1,12}".prop_map(Op::SetFile),
        1 => any::<bool>().prop_map(Op::SetRag),
        1 => proptest::option::of(arb_text()).prop_map(Op::SetPrompt),
        1 => Just(Op::Reset),
    ]
}

fn apply(state: &mut SessionState, op: &Op) {
    match op {
        Op::Append(u, a) => state.append(u.clone(), a.clone()),
        Op::SetFile(id) => state.set_file(id.clone()),
        Op::SetRag(v) => state.set_option(SessionOption::IsRag(*v)),
        Op::SetPrompt(p) => state.set_option(SessionOption::SystemPrompt(p.clone())),
        Op::Reset => state.reset(),
    }
}

fn arb_defaults() -> impl Strategy<Value = SessionOptions> {
    (any::<bool>(), proptest::option::of(arb_text())).prop_map(|(is_rag, system_prompt)| {
        SessionOptions {
            is_rag,
            system_prompt,
        }
    })
}

proptest! {
    #[test]
    fn reset_is_idempotent(
        defaults in arb_defaults(),
        ops in proptest::collection::vec(arb_op(), 0..20),
    ) {
        let mut state = SessionState::new(defaults.clone());
        for op in &ops {
            apply(&mut state, op);
        }

        state.reset();
        let once = state.clone();
        state.reset();

        prop_assert_eq!(&state, &once);
        prop_assert_eq!(state, SessionState::new(defaults));
    }

    #[test]
    fn history_never_contains_the_pending_query(
        ops in proptest::collection::vec(arb_op(), 0..20),
        query in "[a-z]{1,16}",
    ) {
        let mut state = SessionState::default();
        for op in &ops {
            apply(&mut state, op);
        }

        let before = state.clone();
        let request = RequestBuilder::default().build(&state, &query).unwrap();

        prop_assert_eq!(request.history, render_history(state.transcript()));
        prop_assert_eq!(request.query, query);
        prop_assert_eq!(state, before);
    }

    #[test]
    fn append_alternates_user_and_assistant(
        ops in proptest::collection::vec(arb_op(), 0..30),
    ) {
        let mut state = SessionState::default();
        for op in &ops {
            apply(&mut state, op);
        }

        let transcript = state.transcript();
        prop_assert_eq!(transcript.len() % 2, 0);
        for (i, exchange) in transcript.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            prop_assert_eq!(exchange.role, expected);
        }
    }

    #[test]
    fn append_adds_exactly_one_turn_at_the_end(
        ops in proptest::collection::vec(arb_op(), 0..20),
        user in arb_text(),
        assistant in arb_text(),
    ) {
        let mut state = SessionState::default();
        for op in &ops {
            apply(&mut state, op);
        }
        let before = state.transcript().to_vec();

        state.append(user.clone(), assistant.clone());

        let after = state.transcript();
        prop_assert_eq!(after.len(), before.len() + 2);
        prop_assert_eq!(&after[..before.len()], &before[..]);
        prop_assert_eq!(&after[before.len()].text, &user);
        prop_assert_eq!(&after[before.len() + 1].text, &assistant);
    }
}
