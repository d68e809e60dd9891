//! Task store for the signed-in user's task collection.
//!
//! `TaskStore` pairs a [`SyncedCollection`] of [`Task`]s with the remote
//! store. Mutations are written remotely first; on success the local
//! collection is edited in place so the change is visible before the
//! subscription echoes it back.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;

use taskdeck_proto::task::{MAX_TASK_TITLE_LENGTH, Priority, Task, TaskDraft, TaskPatch, TaskStatus};
use taskdeck_proto::value::Document;
use taskdeck_proto::{FromDocument, TaskId, UserId};

use super::TaskStoreError;
use crate::remote::{CollectionPath, RemoteError, RemoteStore};
use crate::sync::{SyncState, SyncedCollection};

/// Synchronized task collection plus its CRUD operations.
pub struct TaskStore<R> {
    remote: Arc<R>,
    tasks: SyncedCollection<Task>,
    max_title_len: usize,
}

impl<R: RemoteStore> TaskStore<R> {
    /// Creates an empty, unsubscribed store.
    #[must_use]
    pub fn new(remote: Arc<R>) -> Self {
        Self {
            remote,
            tasks: SyncedCollection::new("tasks"),
            max_title_len: MAX_TASK_TITLE_LENGTH,
        }
    }

    /// Overrides the maximum title length (in characters).
    #[must_use]
    pub const fn with_max_title_len(mut self, max: usize) -> Self {
        self.max_title_len = max;
        self
    }

    /// Subscribes to `user`'s tasks, cancelling any previous subscription.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Unauthenticated`] for an empty user id, or
    /// [`TaskStoreError::Remote`] if the subscription cannot be opened.
    pub async fn subscribe(&self, user: &UserId) -> Result<(), TaskStoreError> {
        if user.is_empty() {
            tracing::error!("cannot subscribe to tasks without a user");
            return Err(TaskStoreError::Unauthenticated);
        }
        self.tasks
            .subscribe(self.remote.as_ref(), &CollectionPath::tasks(user))
            .await?;
        Ok(())
    }

    /// Re-opens the subscription after a failure.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe`](Self::subscribe).
    pub async fn retry(&self, user: &UserId) -> Result<(), TaskStoreError> {
        self.subscribe(user).await
    }

    /// Cancels the subscription and clears the local tasks.
    pub fn unsubscribe(&self) {
        self.tasks.unsubscribe();
    }

    /// Reads `user`'s tasks once.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Unauthenticated`] for an empty user id, or
    /// [`TaskStoreError::Remote`] if the read fails.
    pub async fn fetch(&self, user: &UserId) -> Result<Vec<Task>, TaskStoreError> {
        if user.is_empty() {
            return Err(TaskStoreError::Unauthenticated);
        }
        Ok(self
            .tasks
            .fetch(self.remote.as_ref(), &CollectionPath::tasks(user))
            .await?)
    }

    /// Creates a task and appends it locally.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Unauthenticated`] without a user,
    /// [`TaskStoreError::TitleEmpty`] / [`TaskStoreError::TitleTooLong`]
    /// for an invalid title, or [`TaskStoreError::Remote`] if the write
    /// fails. Nothing changes locally on error.
    pub async fn add(&self, draft: TaskDraft, user: Option<&UserId>) -> Result<Task, TaskStoreError> {
        let user = require_user(user)?;
        self.validate_title(&draft.title)?;

        let now = Utc::now();
        let record = draft.to_record(user, now);
        let path = CollectionPath::tasks(user);
        let epoch = self.tasks.epoch(&path);
        let id = match self.remote.add(&path, record.clone()).await {
            Ok(id) => id,
            Err(e) => {
                self.tasks.record_error(format!("failed to add task: {e}"));
                return Err(e.into());
            }
        };

        let task = Task::from_document(&Document::new(id, record), now)
            .map_err(|e| RemoteError::Backend(format!("stored task unreadable: {e}")))?;
        self.tasks.upsert(&epoch, task.clone());
        tracing::info!(task = %task.id, status = %task.status, "task added");
        Ok(task)
    }

    /// Writes `patch` to a task and merges it locally.
    ///
    /// Any status change keeps `completed` and `completed_at` consistent.
    /// Returns `Ok(None)` when the task is not in the local collection.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Unauthenticated`] without a user, a title
    /// validation error if the patch sets an invalid title, or
    /// [`TaskStoreError::Remote`] if the write fails.
    pub async fn update(
        &self,
        id: &TaskId,
        mut patch: TaskPatch,
        user: Option<&UserId>,
    ) -> Result<Option<Task>, TaskStoreError> {
        let user = require_user(user)?;
        if let Some(title) = &patch.title {
            self.validate_title(title)?;
        }
        let Some(current) = self.tasks.find(id.as_str()) else {
            tracing::warn!(task = %id, "update of unknown task ignored");
            return Ok(None);
        };

        let now = Utc::now();
        patch.synchronize_with(&current, now);
        let path = CollectionPath::tasks(user);
        let epoch = self.tasks.epoch(&path);
        if let Err(e) = self
            .remote
            .update(&path, id.as_str(), patch.to_record(now))
            .await
        {
            self.tasks.record_error(format!("failed to update task: {e}"));
            return Err(e.into());
        }

        let updated = self
            .tasks
            .modify(&epoch, id.as_str(), |task| task.apply_patch(&patch, now));
        tracing::debug!(task = %id, "task updated");
        Ok(updated)
    }

    /// Moves a task to `status`.
    ///
    /// # Errors
    ///
    /// Same as [`update`](Self::update).
    pub async fn set_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        user: Option<&UserId>,
    ) -> Result<Option<Task>, TaskStoreError> {
        self.update(id, TaskPatch::status(status), user).await
    }

    /// Changes a task's priority.
    ///
    /// # Errors
    ///
    /// Same as [`update`](Self::update).
    pub async fn set_priority(
        &self,
        id: &TaskId,
        priority: Priority,
        user: Option<&UserId>,
    ) -> Result<Option<Task>, TaskStoreError> {
        self.update(id, TaskPatch::priority(priority), user).await
    }

    /// Flips a task between completed and in progress.
    ///
    /// Completing stamps `completed_at`; reopening moves the task to
    /// [`TaskStatus::InProgress`] and keeps the stamp. Returns `Ok(None)`
    /// when the task is not in the local collection.
    ///
    /// # Errors
    ///
    /// Same as [`update`](Self::update).
    pub async fn toggle_completion(
        &self,
        id: &TaskId,
        user: Option<&UserId>,
    ) -> Result<Option<Task>, TaskStoreError> {
        let user = require_user(user)?;
        let Some(current) = self.tasks.find(id.as_str()) else {
            tracing::warn!(task = %id, "toggle of unknown task ignored");
            return Ok(None);
        };
        let next = if current.completed {
            TaskStatus::InProgress
        } else {
            TaskStatus::Completed
        };
        self.update(id, TaskPatch::status(next), Some(user)).await
    }

    /// Deletes a task remotely, then locally.
    ///
    /// A missing user or task id is logged and ignored (`Ok(false)`).
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Remote`] if the delete fails; the local
    /// collection is unchanged.
    pub async fn delete(&self, id: &TaskId, user: Option<&UserId>) -> Result<bool, TaskStoreError> {
        let Some(user) = user.filter(|u| !u.is_empty()) else {
            tracing::warn!(task = %id, "delete without a user ignored");
            return Ok(false);
        };
        if id.is_empty() {
            tracing::warn!("delete without a task id ignored");
            return Ok(false);
        }

        let path = CollectionPath::tasks(user);
        let epoch = self.tasks.epoch(&path);
        if let Err(e) = self.remote.delete(&path, id.as_str()).await
        {
            self.tasks.record_error(format!("failed to delete task: {e}"));
            return Err(e.into());
        }
        self.tasks.remove(&epoch, id.as_str());
        tracing::info!(task = %id, "task deleted");
        Ok(true)
    }

    /// Current tasks, in snapshot order.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.items()
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.find(id.as_str())
    }

    /// Full observable state.
    #[must_use]
    pub fn state(&self) -> SyncState<Task> {
        self.tasks.state()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SyncState<Task>> {
        self.tasks.watch()
    }

    /// Last recorded failure.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.tasks.last_error()
    }

    /// Clears the recorded failure.
    pub fn clear_error(&self) {
        self.tasks.clear_error();
    }

    /// `true` while waiting for the first snapshot.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.tasks.is_loading()
    }

    /// `true` once every local edit has been confirmed by a snapshot.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.tasks.is_converged()
    }

    fn validate_title(&self, title: &str) -> Result<(), TaskStoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(TaskStoreError::TitleEmpty);
        }
        if title.chars().count() > self.max_title_len {
            return Err(TaskStoreError::TitleTooLong {
                max: self.max_title_len,
            });
        }
        Ok(())
    }
}

fn require_user(user: Option<&UserId>) -> Result<&UserId, TaskStoreError> {
    user.filter(|u| !u.is_empty())
        .ok_or(TaskStoreError::Unauthenticated)
}
