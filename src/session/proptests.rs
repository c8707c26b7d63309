//! Property-based tests for the session store
//!
//! Random operation sequences are applied both to the store and to a plain
//! vector model; the two must always agree.

use super::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Append(Role, String),
    Undo,
    DeleteAt(usize),
    EditAt(usize, String),
}

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::System), Just(Role::User), Just(Role::Assistant)]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (arb_role(), "[a-z ]{0,12}").prop_map(|(role, text)| Op::Append(role, text)),
        1 => Just(Op::Undo),
        1 => (0usize..8).prop_map(Op::DeleteAt),
        1 => ((0usize..8), "[a-z]{1,8}").prop_map(|(i, text)| Op::EditAt(i, text)),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

async fn apply(store: &SessionStore, model: &mut Vec<(Role, String)>, op: Op) {
    match op {
        Op::Append(role, text) => {
            let now = store.now();
            store
                .mutate("u", Vec::new, |s| {
                    s.history.push(Message::new(role, text.clone(), now));
                })
                .await;
            model.push((role, text));
        }
        Op::Undo => {
            let removed = store.mutate("u", Vec::new, |s| s.history.pop().is_some()).await;
            assert_eq!(removed, model.pop().is_some());
        }
        Op::DeleteAt(index) => {
            let session = store.get_or_create("u", Vec::new).await;
            if let Some(message) = session.history.get(index) {
                assert!(store.delete_message(message.id).await);
                model.remove(index);
            }
        }
        Op::EditAt(index, text) => {
            let session = store.get_or_create("u", Vec::new).await;
            if let Some(message) = session.history.get(index) {
                assert!(store.update_message_content(message.id, &text).await);
                model[index].1 = text;
            }
        }
    }
}

proptest! {
    #[test]
    fn store_matches_vector_model(ops in prop::collection::vec(arb_op(), 0..40)) {
        runtime().block_on(async {
            let store = SessionStore::new(Arc::new(SystemClock));
            let mut model = Vec::new();
            let mut last_activity = None;

            for op in ops {
                apply(&store, &mut model, op).await;

                let session = store.get_or_create("u", Vec::new).await;
                let actual: Vec<(Role, String)> = session
                    .history
                    .iter()
                    .map(|m| (m.role, m.content.clone()))
                    .collect();
                assert_eq!(actual, model);

                let ids: Vec<MessageId> = session.history.iter().map(|m| m.id).collect();
                assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids must stay sorted");

                if let Some(previous) = last_activity {
                    assert!(session.last_activity >= previous);
                }
                last_activity = Some(session.last_activity);
            }
        });
    }
}
