//! Integration tests for subscription lifecycle.
//!
//! Re-targeting between users, cancellation, late deliveries from a
//! cancelled subscription, error recording and manual retry.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use taskdeck::remote::memory::{InMemoryRemote, Operation};
use taskdeck::remote::{CollectionPath, RemoteError};
use taskdeck::sync::SyncState;
use taskdeck::tasks::{TaskStore, TaskStoreError};
use taskdeck_proto::UserId;
use taskdeck_proto::task::{Task, TaskDraft, fields};
use taskdeck_proto::value::{Document, Record};

fn setup() -> (Arc<InMemoryRemote>, TaskStore<InMemoryRemote>) {
    let remote = Arc::new(InMemoryRemote::new());
    let store = TaskStore::new(Arc::clone(&remote));
    (remote, store)
}

fn task_record(title: &str, user: &UserId) -> Record {
    let mut record = Record::new();
    record.insert(fields::TITLE.into(), title.into());
    record.insert(fields::USER_ID.into(), user.as_str().into());
    record
}

async fn wait_until(
    store: &TaskStore<InMemoryRemote>,
    pred: impl FnMut(&SyncState<Task>) -> bool,
) -> SyncState<Task> {
    let mut rx = store.watch();
    let state = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed")
        .clone();
    state
}

/// Gives spawned listeners a chance to run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ---------------------------------------------------------------------------
// Re-targeting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn switching_users_never_shows_the_previous_users_tasks() {
    let (remote, store) = setup();
    let u1 = UserId::new("u1");
    let u2 = UserId::new("u2");
    remote
        .seed(&CollectionPath::tasks(&u1), "a", task_record("u1 task", &u1))
        .unwrap();
    remote
        .seed(&CollectionPath::tasks(&u2), "b", task_record("u2 task", &u2))
        .unwrap();

    // Queue u1's initial snapshot, then switch before it can be applied.
    remote.hold_delivery();
    store.subscribe(&u1).await.unwrap();
    store.subscribe(&u2).await.unwrap();
    assert_eq!(remote.queued_deliveries(), 2);
    remote.release_delivery();

    let state = wait_until(&store, |s| !s.loading).await;
    assert_eq!(state.items.len(), 1);
    assert_eq!(state.items[0].title, "u2 task");

    // A late snapshot on u1's path reaches nobody.
    remote.inject_snapshot(
        &CollectionPath::tasks(&u1),
        vec![Document::new("late", task_record("stale", &u1))],
    );
    settle().await;
    assert!(store.tasks().iter().all(|t| t.user_id == u2));
    assert_eq!(remote.subscriber_count(&CollectionPath::tasks(&u1)), 0);
    assert_eq!(remote.subscriber_count(&CollectionPath::tasks(&u2)), 1);
}

#[tokio::test]
async fn resubscribing_to_the_same_user_keeps_one_listener() {
    let (remote, store) = setup();
    let u1 = UserId::new("u1");
    let path = CollectionPath::tasks(&u1);

    store.subscribe(&u1).await.unwrap();
    store.subscribe(&u1).await.unwrap();
    store.subscribe(&u1).await.unwrap();
    wait_until(&store, |s| !s.loading).await;
    assert_eq!(remote.subscriber_count(&path), 1);

    remote.seed(&path, "x", task_record("one", &u1)).unwrap();
    let state = wait_until(&store, |s| !s.items.is_empty()).await;
    assert_eq!(state.items.len(), 1);
}

// ---------------------------------------------------------------------------
// Unsubscribe
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsubscribe_clears_and_ignores_later_writes() {
    let (remote, store) = setup();
    let u1 = UserId::new("u1");
    let path = CollectionPath::tasks(&u1);
    remote.seed(&path, "a", task_record("first", &u1)).unwrap();

    store.subscribe(&u1).await.unwrap();
    wait_until(&store, |s| s.items.len() == 1).await;

    store.unsubscribe();
    assert!(store.tasks().is_empty());
    assert!(!store.state().subscribed);

    remote.seed(&path, "b", task_record("second", &u1)).unwrap();
    remote.inject_snapshot(&path, vec![Document::new("c", task_record("third", &u1))]);
    settle().await;
    assert!(store.tasks().is_empty());
    assert_eq!(remote.subscriber_count(&path), 0);
}

#[tokio::test]
async fn unsubscribe_without_subscription_is_a_noop() {
    let (_remote, store) = setup();
    store.unsubscribe();
    store.unsubscribe();
    assert!(store.tasks().is_empty());
    assert!(!store.is_loading());
}

#[tokio::test]
async fn local_edit_from_before_a_switch_is_dropped() {
    let (remote, store) = setup();
    let u1 = UserId::new("u1");
    let u2 = UserId::new("u2");
    store.subscribe(&u1).await.unwrap();
    wait_until(&store, |s| !s.loading).await;

    // Hold deliveries so the add's echo cannot race the assertions below.
    remote.hold_delivery();
    store.add(TaskDraft::new("for u1"), Some(&u1)).await.unwrap();
    store.subscribe(&u2).await.unwrap();
    assert!(store.tasks().is_empty());

    remote.release_delivery();
    let state = wait_until(&store, |s| !s.loading).await;
    assert!(state.items.is_empty());
}

// ---------------------------------------------------------------------------
// Errors and retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscription_failure_keeps_stale_data_and_allows_retry() {
    let (remote, store) = setup();
    let u1 = UserId::new("u1");
    let path = CollectionPath::tasks(&u1);
    remote.seed(&path, "a", task_record("kept", &u1)).unwrap();

    store.subscribe(&u1).await.unwrap();
    wait_until(&store, |s| s.items.len() == 1).await;

    remote.fail_subscriptions(&path, RemoteError::PermissionDenied("rules".into()));
    let failed = wait_until(&store, |s| s.error.is_some()).await;
    assert_eq!(failed.items.len(), 1);
    assert!(!failed.loading);
    assert!(!failed.subscribed);
    assert!(store.last_error().unwrap().contains("rules"));

    store.retry(&u1).await.unwrap();
    let recovered = wait_until(&store, |s| s.subscribed && !s.loading).await;
    assert!(recovered.error.is_none());
    assert_eq!(recovered.items.len(), 1);
}

#[tokio::test]
async fn failed_open_is_recorded() {
    let (remote, store) = setup();
    remote.fail_next(
        Operation::Subscribe,
        RemoteError::Unavailable("no network".into()),
    );

    let err = store.subscribe(&UserId::new("u1")).await.unwrap_err();
    assert!(matches!(err, TaskStoreError::Remote(RemoteError::Unavailable(_))));
    assert!(!store.is_loading());
    assert!(store.last_error().is_some());
}

#[tokio::test]
async fn empty_user_cannot_subscribe() {
    let (remote, store) = setup();
    let err = store.subscribe(&UserId::new("")).await.unwrap_err();
    assert_eq!(err, TaskStoreError::Unauthenticated);
    assert_eq!(remote.subscriber_count(&CollectionPath::tasks(&UserId::new(""))), 0);
}

#[tokio::test]
async fn fetch_does_not_disturb_a_live_subscription() {
    let (remote, store) = setup();
    let u1 = UserId::new("u1");
    let u2 = UserId::new("u2");
    remote
        .seed(&CollectionPath::tasks(&u2), "b", task_record("other", &u2))
        .unwrap();

    store.subscribe(&u1).await.unwrap();
    wait_until(&store, |s| !s.loading).await;

    let fetched = store.fetch(&u2).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert!(store.tasks().is_empty());
    assert!(store.state().subscribed);
}
