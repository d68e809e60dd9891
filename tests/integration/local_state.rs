//! Integration tests for state persisted on this device.
//!
//! Theme and timer state in file storage, and the file-backed document
//! store surviving a restart.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use taskdeck::pomodoro::{POMODORO_STORAGE_KEY, PomodoroPhase, PomodoroTimer};
use taskdeck::remote::RemoteError;
use taskdeck::remote::memory::InMemoryRemote;
use taskdeck::storage::{FileStorage, LocalStorage};
use taskdeck::tasks::TaskStore;
use taskdeck::theme::{THEME_STORAGE_KEY, ThemeStore};
use taskdeck_proto::task::{Priority, TaskDraft, TaskStatus};
use taskdeck_proto::{TaskId, UserId};

#[test]
fn theme_choice_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let storage = FileStorage::new(dir.path());
        let mut theme = ThemeStore::load(&storage);
        // First launch follows the system, then the user flips it.
        assert!(theme.initialize(true).unwrap());
        assert!(!theme.toggle(true).unwrap());
    }

    let storage = FileStorage::new(dir.path());
    let mut theme = ThemeStore::load(&storage);
    assert!(!theme.initialize(true).unwrap());
    assert!(dir.path().join(format!("{THEME_STORAGE_KEY}.bin")).exists());
}

#[test]
fn timer_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path());

    let mut timer = PomodoroTimer::new();
    timer.set_break_minutes(10).unwrap();
    timer.start(None);
    for _ in 0..60 {
        timer.tick();
    }
    timer.pause();
    timer.save(&storage).unwrap();

    let restored = PomodoroTimer::load(&FileStorage::new(dir.path()));
    assert_eq!(restored.phase(), PomodoroPhase::WorkPaused);
    assert_eq!(restored.state().time_remaining, 24 * 60);
    assert_eq!(restored.state().break_duration, 10 * 60);
}

#[test]
fn corrupt_timer_state_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path());
    storage.set(POMODORO_STORAGE_KEY, b"\xff\xff\xff\xff").unwrap();

    let timer = PomodoroTimer::load(&storage);
    assert_eq!(timer.phase(), PomodoroPhase::Idle);
    assert_eq!(timer.state().completed_sessions, 0);
}

#[tokio::test]
async fn document_store_file_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("data").join("store.json");
    let user = UserId::new("u1");

    let id: TaskId = {
        let remote = Arc::new(InMemoryRemote::open(&file).unwrap());
        let store = TaskStore::new(remote);
        let task = store
            .add(
                TaskDraft::new("Persisted").priority(Priority::Low),
                Some(&user),
            )
            .await
            .unwrap();
        store
            .set_status(&task.id, TaskStatus::Completed, Some(&user))
            .await
            .unwrap();
        task.id
    };
    assert!(file.exists());

    let remote = Arc::new(InMemoryRemote::open(&file).unwrap());
    let store = TaskStore::new(remote);
    let tasks = store.fetch(&user).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, id);
    assert_eq!(tasks[0].priority, Priority::Low);
    assert!(tasks[0].completed);
    assert!(tasks[0].completed_at.is_some());

    // Other users see nothing.
    assert!(store.fetch(&UserId::new("u2")).await.unwrap().is_empty());
}

#[test]
fn corrupt_document_store_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("store.json");
    std::fs::write(&file, "[1, 2").unwrap();

    assert!(matches!(
        InMemoryRemote::open(&file),
        Err(RemoteError::Backend(_))
    ));
}
