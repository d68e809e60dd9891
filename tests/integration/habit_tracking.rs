//! Integration tests for habit tracking.
//!
//! Progress cycling through the goal, one log per habit and day, deletion
//! cascading to logs, and convergence with a live subscription.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use taskdeck::habits::{HabitStore, HabitStoreError, week_dates};
use taskdeck::remote::memory::{InMemoryRemote, Operation};
use taskdeck::remote::{CollectionPath, RemoteError, RemoteStore};
use taskdeck_proto::UserId;
use taskdeck_proto::habit::{Frequency, HabitDraft, HabitLog};

fn setup() -> (Arc<InMemoryRemote>, HabitStore<InMemoryRemote>) {
    let remote = Arc::new(InMemoryRemote::new());
    let store = HabitStore::new(Arc::clone(&remote));
    (remote, store)
}

fn u1() -> UserId {
    UserId::new("u1")
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

/// Polls `cond` until it holds or two seconds pass.
async fn eventually(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

#[tokio::test]
async fn progress_cycles_through_goal_and_back_to_zero() {
    let (remote, store) = setup();
    let habit = store
        .add_habit(HabitDraft::new("Drink water").goal(3), Some(&u1()))
        .await
        .unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(store.toggle_completion(&habit, day(3), Some(&u1())).await.unwrap());
    }
    assert_eq!(seen, [1, 2, 3, 0]);

    // After wrapping, no log is persisted at zero.
    assert!(store.logs_for(&habit.id).is_empty());
    let remote_logs = remote
        .get_all(&CollectionPath::habit_logs(&u1()))
        .await
        .unwrap();
    assert!(remote_logs.is_empty());
    assert_eq!(store.progress(&habit.id, day(3)), 0);
}

#[tokio::test]
async fn one_log_per_habit_and_day() {
    let (remote, store) = setup();
    let habit = store
        .add_habit(HabitDraft::new("Read").goal(5), Some(&u1()))
        .await
        .unwrap();

    for _ in 0..3 {
        store.toggle_completion(&habit, day(3), Some(&u1())).await.unwrap();
    }
    store.toggle_completion(&habit, day(4), Some(&u1())).await.unwrap();

    assert_eq!(store.logs_for(&habit.id).len(), 2);
    assert_eq!(store.progress(&habit.id, day(3)), 3);
    assert_eq!(store.progress(&habit.id, day(4)), 1);
    assert_eq!(
        remote
            .get_all(&CollectionPath::habit_logs(&u1()))
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn remote_progress_beyond_goal_wraps_to_zero() {
    let (remote, store) = setup();
    let habit = store
        .add_habit(HabitDraft::new("Push-ups").goal(3), Some(&u1()))
        .await
        .unwrap();
    let logs = CollectionPath::habit_logs(&u1());
    remote
        .seed(
            &logs,
            "huge",
            HabitLog::new_record(&habit.id, day(6), u32::MAX, &u1(), Utc::now()),
        )
        .unwrap();
    store.fetch(&u1()).await.unwrap();
    assert_eq!(store.progress(&habit.id, day(6)), u32::MAX);

    assert_eq!(
        store.toggle_completion(&habit, day(6), Some(&u1())).await.unwrap(),
        0
    );
    assert!(store.logs_for(&habit.id).is_empty());
    assert!(remote.record(&logs, "huge").is_none());
}

#[tokio::test]
async fn habits_for_another_user_stay_out_of_the_live_collection() {
    let (remote, store) = setup();
    let u2 = UserId::new("u2");
    store.subscribe(&u2).await.unwrap();
    eventually(|| !store.is_loading()).await;

    let foreign = store
        .add_habit(HabitDraft::new("Not mine"), Some(&u1()))
        .await
        .unwrap();
    assert!(store.habits().is_empty());
    store.toggle_completion(&foreign, day(4), Some(&u1())).await.unwrap();
    assert!(store.logs().is_empty());
    assert_eq!(
        remote
            .get_all(&CollectionPath::habit_logs(&u1()))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn goal_met_only_at_goal() {
    let (_remote, store) = setup();
    let habit = store
        .add_habit(HabitDraft::new("Stretch").goal(2), Some(&u1()))
        .await
        .unwrap();
    store.toggle_completion(&habit, day(5), Some(&u1())).await.unwrap();
    assert!(!store.is_goal_met(&habit, day(5)));
    store.toggle_completion(&habit, day(5), Some(&u1())).await.unwrap();
    assert!(store.is_goal_met(&habit, day(5)));
}

#[tokio::test]
async fn deleting_a_habit_removes_its_logs() {
    let (remote, store) = setup();
    let keep = store
        .add_habit(HabitDraft::new("Keep"), Some(&u1()))
        .await
        .unwrap();
    let gone = store
        .add_habit(
            HabitDraft::new("Drop").frequency(Frequency::Weekly),
            Some(&u1()),
        )
        .await
        .unwrap();
    store.toggle_completion(&keep, day(1), Some(&u1())).await.unwrap();
    store.toggle_completion(&gone, day(1), Some(&u1())).await.unwrap();
    store.toggle_completion(&gone, day(2), Some(&u1())).await.unwrap();

    assert!(store.delete_habit(&gone.id, Some(&u1())).await.unwrap());

    assert_eq!(store.habits().len(), 1);
    assert!(store.logs_for(&gone.id).is_empty());
    assert_eq!(store.logs_for(&keep.id).len(), 1);
    let remote_logs = remote
        .get_all(&CollectionPath::habit_logs(&u1()))
        .await
        .unwrap();
    assert_eq!(remote_logs.len(), 1);
}

#[tokio::test]
async fn validation_and_auth_fail_before_the_network() {
    let (remote, store) = setup();
    remote.fail_next(Operation::Add, RemoteError::Unavailable("down".into()));

    assert_eq!(
        store.add_habit(HabitDraft::new("   "), Some(&u1())).await.unwrap_err(),
        HabitStoreError::NameEmpty
    );
    assert_eq!(
        store.add_habit(HabitDraft::new("Run"), None).await.unwrap_err(),
        HabitStoreError::Unauthenticated
    );
    // The armed failure is consumed by the first real call.
    assert!(matches!(
        store.add_habit(HabitDraft::new("Run"), Some(&u1())).await,
        Err(HabitStoreError::Remote(_))
    ));
    assert!(store.last_error().is_some());
}

#[tokio::test]
async fn failed_toggle_leaves_progress_unchanged() {
    let (remote, store) = setup();
    let habit = store
        .add_habit(HabitDraft::new("Walk").goal(3), Some(&u1()))
        .await
        .unwrap();
    store.toggle_completion(&habit, day(7), Some(&u1())).await.unwrap();

    remote.fail_next(Operation::Update, RemoteError::Unavailable("down".into()));
    assert!(store.toggle_completion(&habit, day(7), Some(&u1())).await.is_err());
    assert_eq!(store.progress(&habit.id, day(7)), 1);
}

#[tokio::test]
async fn live_subscription_converges_after_toggles() {
    let (remote, store) = setup();
    store.subscribe(&u1()).await.unwrap();
    eventually(|| !store.is_loading()).await;

    let habit = store
        .add_habit(HabitDraft::new("Meditate").goal(2), Some(&u1()))
        .await
        .unwrap();
    store.toggle_completion(&habit, day(10), Some(&u1())).await.unwrap();
    store.toggle_completion(&habit, day(10), Some(&u1())).await.unwrap();

    eventually(|| store.is_converged() && store.progress(&habit.id, day(10)) == 2).await;
    assert_eq!(store.habits().len(), 1);
    assert_eq!(store.logs_for(&habit.id).len(), 1);
    assert_eq!(remote.subscriber_count(&CollectionPath::habits(&u1())), 1);

    store.unsubscribe();
    assert!(store.habits().is_empty());
    assert!(store.logs().is_empty());
}

#[test]
fn week_view_is_sunday_first() {
    // 2024-06-05 is a Wednesday.
    let week = week_dates(day(5));
    assert_eq!(week.first(), Some(&day(2)));
    assert_eq!(week.last(), Some(&day(8)));
}
