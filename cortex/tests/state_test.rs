use std::sync::Arc;

use agenthub_proto::{Message, Part, Role};
use agenthub_cortex::{ConversationState, InMemorySessionStore, SessionStore, TaskContext};

fn message(text: &str) -> Message {
    Message {
        message_id: format!("msg_{}", uuid::Uuid::new_v4()),
        context_id: "s1".to_string(),
        task_id: String::new(),
        role: Role::User as i32,
        content: vec![Part::text(text)],
        metadata: Default::default(),
        extensions: vec![],
    }
}

#[tokio::test]
async fn unknown_session_is_created_on_demand() {
    let store = InMemorySessionStore::new();
    assert!(store.get("s1").await.is_none());

    let handle = store.session("s1").await;
    {
        let state = handle.lock().await;
        assert_eq!(state.session_id, "s1");
        assert!(state.messages.is_empty());
    }
    assert!(store.get("s1").await.is_some());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn set_replaces_state() {
    let store = InMemorySessionStore::new();
    let mut state = ConversationState::new("s1");
    state.messages.push(message("hello"));
    state.pending_tasks.insert(
        "t1".to_string(),
        TaskContext::new("t1".to_string(), "translate".to_string(), message("hello")),
    );
    store.set("s1", state).await;

    let loaded = store.get("s1").await.unwrap();
    assert_eq!(loaded.messages.len(), 1);
    assert_eq!(loaded.pending_tasks.len(), 1);
    assert!(!loaded.pending_tasks["t1"].user_notified);
}

#[tokio::test]
async fn sessions_have_independent_locks() {
    let store = Arc::new(InMemorySessionStore::new());

    // Hold the lock on s1 while mutating s2; the second operation must not
    // wait on the first.
    let s1 = store.session("s1").await;
    let _held = s1.lock().await;

    let store2 = Arc::clone(&store);
    let other = tokio::time::timeout(std::time::Duration::from_secs(1), async move {
        let s2 = store2.session("s2").await;
        let mut state = s2.lock().await;
        state.messages.push(message("independent"));
    })
    .await;
    assert!(other.is_ok(), "operation on another session blocked");
}

#[tokio::test]
async fn same_handle_is_returned_for_a_session() {
    let store = InMemorySessionStore::new();
    let a = store.session("s1").await;
    let b = store.session("s1").await;
    assert!(Arc::ptr_eq(&a, &b));
}
