//! Integration tests for the task store and its derived views.
//!
//! Drives `TaskStore` against the in-memory remote store and checks the
//! completion rules, local reconciliation against live snapshots, and the
//! board/filter/count projections.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::similar_names)]

use std::sync::Arc;
use std::time::Duration;

use taskdeck::remote::memory::{InMemoryRemote, Operation};
use taskdeck::remote::{CollectionPath, RemoteError, RemoteStore};
use taskdeck::sync::SyncState;
use taskdeck::tasks::views::{self, PriorityFilter, TaskFilter};
use taskdeck::tasks::{TaskStore, TaskStoreError};
use taskdeck_proto::task::{DueInput, Priority, Task, TaskDraft, TaskStatus, fields};
use taskdeck_proto::value::{Record, Value, provider_timestamp};
use taskdeck_proto::{TaskId, UserId};

fn setup() -> (Arc<InMemoryRemote>, TaskStore<InMemoryRemote>) {
    let remote = Arc::new(InMemoryRemote::new());
    let store = TaskStore::new(Arc::clone(&remote));
    (remote, store)
}

fn u1() -> UserId {
    UserId::new("u1")
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

// ---------------------------------------------------------------------------
// Add
// ---------------------------------------------------------------------------

#[tokio::test]
async fn added_task_shows_up_in_to_do_column() {
    let (_remote, store) = setup();
    let draft = TaskDraft::new("Write report")
        .status(TaskStatus::ToDo)
        .priority(Priority::High);

    let task = store.add(draft, Some(&u1())).await.unwrap();
    assert!(!task.id.is_empty());
    assert!(!task.completed);
    assert!(task.completed_at.is_none());

    let tasks = store.tasks();
    let board = views::by_status(&tasks);
    assert_eq!(board.to_do.len(), 1);
    assert_eq!(board.to_do[0].id, task.id);
    assert!(board.in_progress.is_empty());
    assert!(board.completed.is_empty());
}

#[tokio::test]
async fn invalid_due_text_degrades_to_no_due_date() {
    let (_remote, store) = setup();
    let task = store
        .add(
            TaskDraft::new("Someday").due(DueInput::Text("next tuesday-ish".into())),
            Some(&u1()),
        )
        .await
        .unwrap();
    assert!(task.due_date.is_none());

    let dated = store
        .add(
            TaskDraft::new("Dated").due(DueInput::Text("2024-03-09".into())),
            Some(&u1()),
        )
        .await
        .unwrap();
    assert_eq!(dated.due_date.unwrap().to_rfc3339(), "2024-03-09T00:00:00+00:00");
}

#[tokio::test]
async fn unauthenticated_add_never_reaches_remote() {
    let (remote, store) = setup();
    remote.fail_next(Operation::Add, RemoteError::Unavailable("offline".into()));

    let err = store.add(TaskDraft::new("x"), None).await.unwrap_err();
    assert_eq!(err, TaskStoreError::Unauthenticated);

    // The injected failure is still armed: the add above never hit the store.
    let err = store.add(TaskDraft::new("x"), Some(&u1())).await.unwrap_err();
    assert!(matches!(err, TaskStoreError::Remote(RemoteError::Unavailable(_))));
    assert!(store.tasks().is_empty());
    assert!(store.last_error().is_some());
}

#[tokio::test]
async fn add_with_live_subscription_never_duplicates() {
    let (remote, store) = setup();
    store.subscribe(&u1()).await.unwrap();
    wait_until(&store, |s| !s.loading).await;

    remote.hold_delivery();
    let task = store.add(TaskDraft::new("Once"), Some(&u1())).await.unwrap();
    assert_eq!(store.tasks().len(), 1);
    assert!(!store.is_converged());

    remote.release_delivery();
    let state = wait_until(&store, |s| s.pending.is_empty()).await;
    assert_eq!(state.items.len(), 1);
    assert_eq!(state.items[0].id, task.id);
    assert!(store.is_converged());
}

#[tokio::test]
async fn burst_of_adds_converges_to_every_task() {
    let (remote, store) = setup();
    store.subscribe(&u1()).await.unwrap();
    wait_until(&store, |s| !s.loading).await;

    // No yield between writes: the listener only sees the tail of the burst.
    for i in 0..100 {
        store
            .add(TaskDraft::new(format!("task {i}")), Some(&u1()))
            .await
            .unwrap();
    }
    assert_eq!(store.tasks().len(), 100);

    let state = wait_until(&store, |s| s.pending.is_empty()).await;
    assert_eq!(state.items.len(), 100);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.tasks().len(), 100);
    assert!(store.is_converged());
    assert_eq!(
        remote
            .get_all(&CollectionPath::tasks(&u1()))
            .await
            .unwrap()
            .len(),
        100
    );
}

#[tokio::test]
async fn writes_for_another_user_stay_out_of_the_live_collection() {
    let (remote, store) = setup();
    let u2 = UserId::new("u2");
    store.subscribe(&u2).await.unwrap();
    wait_until(&store, |s| !s.loading).await;

    let foreign = store
        .add(TaskDraft::new("u1 secret"), Some(&u1()))
        .await
        .unwrap();
    assert!(store.tasks().is_empty());
    assert!(
        remote
            .record(&CollectionPath::tasks(&u1()), foreign.id.as_str())
            .is_some()
    );

    let own = store.add(TaskDraft::new("u2 task"), Some(&u2)).await.unwrap();
    let state = wait_until(&store, |s| s.pending.is_empty() && !s.items.is_empty()).await;
    assert_eq!(state.items.len(), 1);
    assert_eq!(state.items[0].id, own.id);
    assert!(state.items.iter().all(|t| t.user_id == u2));
}

// ---------------------------------------------------------------------------
// Status and completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_then_in_progress_keeps_stamp() {
    let (remote, store) = setup();
    let task = store.add(TaskDraft::new("Report"), Some(&u1())).await.unwrap();

    let done = store
        .set_status(&task.id, TaskStatus::Completed, Some(&u1()))
        .await
        .unwrap()
        .unwrap();
    let stamp = done.completed_at.expect("stamped on completion");
    assert!(done.completed);

    let reopened = store
        .set_status(&task.id, TaskStatus::InProgress, Some(&u1()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reopened.status, TaskStatus::InProgress);
    assert!(!reopened.completed);
    assert_eq!(reopened.completed_at, Some(stamp));

    // The remote record agrees with the local one.
    let record = remote
        .record(&CollectionPath::tasks(&u1()), task.id.as_str())
        .unwrap();
    assert_eq!(record.get(fields::COMPLETED), Some(&Value::Bool(false)));
    assert!(record.contains_key(fields::COMPLETED_AT));
}

#[tokio::test]
async fn toggling_twice_restores_status_and_keeps_stamp() {
    let (_remote, store) = setup();
    let task = store
        .add(
            TaskDraft::new("Flip").status(TaskStatus::InProgress),
            Some(&u1()),
        )
        .await
        .unwrap();

    let first = store
        .toggle_completion(&task.id, Some(&u1()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, TaskStatus::Completed);
    let stamp = first.completed_at.unwrap();

    let second = store
        .toggle_completion(&task.id, Some(&u1()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.status, TaskStatus::InProgress);
    assert_eq!(second.completed_at, Some(stamp));
}

#[tokio::test]
async fn toggling_a_to_do_task_reopens_it_in_progress() {
    let (_remote, store) = setup();
    let task = store.add(TaskDraft::new("Fresh"), Some(&u1())).await.unwrap();
    assert_eq!(task.status, TaskStatus::ToDo);

    let done = store
        .toggle_completion(&task.id, Some(&u1()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.completed_at.is_some());

    // Reopening never goes back to to-do.
    let reopened = store
        .toggle_completion(&task.id, Some(&u1()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reopened.status, TaskStatus::InProgress);
    assert!(!reopened.completed);
    assert_eq!(reopened.completed_at, done.completed_at);
}

#[tokio::test]
async fn completed_at_tracks_completion_history() {
    let (_remote, store) = setup();
    let task = store.add(TaskDraft::new("History"), Some(&u1())).await.unwrap();
    let mut ever_completed = false;

    for status in [
        TaskStatus::InProgress,
        TaskStatus::ToDo,
        TaskStatus::Completed,
        TaskStatus::Completed,
        TaskStatus::ToDo,
        TaskStatus::InProgress,
    ] {
        let t = store
            .set_status(&task.id, status, Some(&u1()))
            .await
            .unwrap()
            .unwrap();
        ever_completed |= status == TaskStatus::Completed;
        assert_eq!(t.completed_at.is_some(), ever_completed, "after {status}");
        assert_eq!(t.completed, t.status == TaskStatus::Completed);
    }
}

#[tokio::test]
async fn operations_on_unknown_tasks_are_noops() {
    let (_remote, store) = setup();
    let ghost = TaskId::new("ghost");
    assert!(store.toggle_completion(&ghost, Some(&u1())).await.unwrap().is_none());
    assert!(
        store
            .set_priority(&ghost, Priority::Low, Some(&u1()))
            .await
            .unwrap()
            .is_none()
    );
    assert!(!store.delete(&TaskId::new(""), Some(&u1())).await.unwrap());
    assert!(!store.delete(&ghost, None).await.unwrap());
}

// ---------------------------------------------------------------------------
// Normalization of remote records
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provider_timestamps_and_missing_fields_are_normalized() {
    let (remote, store) = setup();
    let path = CollectionPath::tasks(&u1());
    let created = chrono::DateTime::parse_from_rfc3339("2024-02-01T08:30:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);

    let mut record = Record::new();
    record.insert(fields::TITLE.into(), "Legacy".into());
    record.insert(fields::STATUS.into(), "completed".into());
    record.insert(fields::COMPLETED.into(), false.into());
    record.insert(fields::CREATED_AT.into(), provider_timestamp(created));
    record.insert(fields::DUE_DATE.into(), "not a date".into());
    remote.seed(&path, "legacy-1", record).unwrap();

    let before = chrono::Utc::now();
    let tasks = store.fetch(&u1()).await.unwrap();
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.created_at, created);
    assert!(task.updated_at >= before);
    assert!(task.due_date.is_none());
    assert_eq!(task.priority, Priority::Medium);
    assert!(task.description.is_empty());
    // `completed` is derived from the status, not read from the record.
    assert!(task.completed);
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

async fn seeded_store() -> TaskStore<InMemoryRemote> {
    let (_remote, store) = setup();
    let rows = [
        ("Write report", "quarterly numbers", TaskStatus::ToDo, Priority::High),
        ("Review PR", "parser rewrite", TaskStatus::InProgress, Priority::High),
        ("Book flights", "REPORT trip", TaskStatus::ToDo, Priority::Low),
        ("Fix bug", "", TaskStatus::Completed, Priority::Medium),
        ("Report expenses", "", TaskStatus::Completed, Priority::High),
    ];
    for (title, description, status, priority) in rows {
        store
            .add(
                TaskDraft::new(title)
                    .description(description)
                    .status(status)
                    .priority(priority),
                Some(&u1()),
            )
            .await
            .unwrap();
    }
    store
}

fn ids(tasks: &[&Task]) -> Vec<TaskId> {
    let mut ids: Vec<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn compound_filter_is_order_independent() {
    let store = seeded_store().await;
    let tasks = store.tasks();

    let by_status = |ts: &[Task]| -> Vec<Task> {
        ts.iter()
            .filter(|t| TaskFilter::default().status(TaskStatus::ToDo).matches(t))
            .cloned()
            .collect()
    };
    let by_priority = |ts: &[Task]| -> Vec<Task> {
        views::by_priority(ts, PriorityFilter::Only(Priority::High))
            .into_iter()
            .cloned()
            .collect()
    };
    let by_text = |ts: &[Task]| -> Vec<Task> {
        views::search(ts, "report").into_iter().cloned().collect()
    };

    let combined = views::filter_tasks(
        &tasks,
        &TaskFilter::default()
            .status(TaskStatus::ToDo)
            .priority(Priority::High)
            .text("report"),
    );
    let expected = ids(&combined);
    assert_eq!(expected.len(), 1);

    let orders: [[&dyn Fn(&[Task]) -> Vec<Task>; 3]; 6] = [
        [&by_status, &by_priority, &by_text],
        [&by_status, &by_text, &by_priority],
        [&by_priority, &by_status, &by_text],
        [&by_priority, &by_text, &by_status],
        [&by_text, &by_status, &by_priority],
        [&by_text, &by_priority, &by_status],
    ];
    for order in orders {
        let result = order.iter().fold(tasks.clone(), |acc, f| f(&acc));
        let refs: Vec<&Task> = result.iter().collect();
        assert_eq!(ids(&refs), expected);
    }
}

#[tokio::test]
async fn counts_and_ratio() {
    let store = seeded_store().await;
    let counts = views::aggregate_counts(&store.tasks());
    assert_eq!(counts.total, 5);
    assert_eq!(counts.to_do, 2);
    assert_eq!(counts.in_progress, 1);
    assert_eq!(counts.completed, 2);
    assert_eq!(counts.high, 3);
    assert_eq!(counts.medium, 1);
    assert_eq!(counts.low, 1);
    assert!((counts.completion_ratio() - 0.4).abs() < f64::EPSILON);
    assert_eq!(counts.completion_percent(), 40);
}

#[test]
fn empty_collection_has_zero_ratio() {
    let counts = views::aggregate_counts(&[]);
    assert_eq!(counts.total, 0);
    assert_eq!(counts.completed, 0);
    assert!(counts.completion_ratio().abs() < f64::EPSILON);
    assert!(!counts.completion_ratio().is_nan());
    assert_eq!(counts.completion_percent(), 0);
    assert!(views::status_shares(&[]).iter().all(|(_, share)| share.abs() < f64::EPSILON));
}

#[tokio::test]
async fn board_preserves_relative_order() {
    let store = seeded_store().await;
    let tasks = store.tasks();
    let board = views::by_status(&tasks);
    let titles: Vec<&str> = board.to_do.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, ["Write report", "Book flights"]);
    let done: Vec<&str> = board
        .column(TaskStatus::Completed)
        .iter()
        .map(|t| t.title.as_str())
        .collect();
    assert_eq!(done, ["Fix bug", "Report expenses"]);
}
