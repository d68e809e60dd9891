//! Habit store: synchronized habits plus their per-day progress logs.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use taskdeck_proto::habit::{Habit, HabitDraft, HabitLog, fields};
use taskdeck_proto::value::Document;
use taskdeck_proto::{FromDocument, HabitId, UserId};

use super::HabitStoreError;
use crate::remote::{CollectionPath, RemoteError, RemoteStore};
use crate::sync::{SyncState, SyncedCollection};

/// Synchronized habits and habit logs for one user.
pub struct HabitStore<R> {
    remote: Arc<R>,
    habits: SyncedCollection<Habit>,
    logs: SyncedCollection<HabitLog>,
}

impl<R: RemoteStore> HabitStore<R> {
    /// Creates an empty, unsubscribed store.
    #[must_use]
    pub fn new(remote: Arc<R>) -> Self {
        Self {
            remote,
            habits: SyncedCollection::new("habits"),
            logs: SyncedCollection::new("habit_logs"),
        }
    }

    /// Subscribes to `user`'s habits and logs.
    ///
    /// # Errors
    ///
    /// Returns [`HabitStoreError::Unauthenticated`] for an empty user id, or
    /// [`HabitStoreError::Remote`] if either subscription cannot be opened.
    pub async fn subscribe(&self, user: &UserId) -> Result<(), HabitStoreError> {
        if user.is_empty() {
            return Err(HabitStoreError::Unauthenticated);
        }
        let remote = self.remote.as_ref();
        self.habits
            .subscribe(remote, &CollectionPath::habits(user))
            .await?;
        self.logs
            .subscribe(remote, &CollectionPath::habit_logs(user))
            .await?;
        Ok(())
    }

    /// Cancels both subscriptions and clears the local state.
    pub fn unsubscribe(&self) {
        self.habits.unsubscribe();
        self.logs.unsubscribe();
    }

    /// Reads `user`'s habits and logs once.
    ///
    /// # Errors
    ///
    /// Returns [`HabitStoreError::Unauthenticated`] for an empty user id, or
    /// [`HabitStoreError::Remote`] if a read fails.
    pub async fn fetch(&self, user: &UserId) -> Result<(), HabitStoreError> {
        if user.is_empty() {
            return Err(HabitStoreError::Unauthenticated);
        }
        let remote = self.remote.as_ref();
        self.habits.fetch(remote, &CollectionPath::habits(user)).await?;
        self.logs
            .fetch(remote, &CollectionPath::habit_logs(user))
            .await?;
        Ok(())
    }

    /// Creates a habit and appends it locally.
    ///
    /// # Errors
    ///
    /// Returns [`HabitStoreError::Unauthenticated`] without a user,
    /// [`HabitStoreError::NameEmpty`] for a blank name, or
    /// [`HabitStoreError::Remote`] if the write fails.
    pub async fn add_habit(
        &self,
        draft: HabitDraft,
        user: Option<&UserId>,
    ) -> Result<Habit, HabitStoreError> {
        let user = require_user(user)?;
        if draft.name.trim().is_empty() {
            return Err(HabitStoreError::NameEmpty);
        }

        let now = Utc::now();
        let record = draft.to_record(user, now);
        let path = CollectionPath::habits(user);
        let epoch = self.habits.epoch(&path);
        let id = match self.remote.add(&path, record.clone()).await {
            Ok(id) => id,
            Err(e) => {
                self.habits.record_error(format!("failed to add habit: {e}"));
                return Err(e.into());
            }
        };
        let habit = Habit::from_document(&Document::new(id, record), now)?;
        self.habits.upsert(&epoch, habit.clone());
        tracing::info!(habit = %habit.id, goal = habit.goal, "habit added");
        Ok(habit)
    }

    /// Deletes a habit and every log recorded for it.
    ///
    /// A missing user or habit id is logged and ignored (`Ok(false)`).
    ///
    /// # Errors
    ///
    /// Returns [`HabitStoreError::Remote`] if a delete fails. Logs deleted
    /// before the failure stay deleted.
    pub async fn delete_habit(
        &self,
        id: &HabitId,
        user: Option<&UserId>,
    ) -> Result<bool, HabitStoreError> {
        let Some(user) = user.filter(|u| !u.is_empty()) else {
            tracing::warn!(habit = %id, "delete without a user ignored");
            return Ok(false);
        };
        if id.is_empty() {
            tracing::warn!("delete without a habit id ignored");
            return Ok(false);
        }

        let habits_path = CollectionPath::habits(user);
        let logs_path = CollectionPath::habit_logs(user);
        let habit_epoch = self.habits.epoch(&habits_path);
        let log_epoch = self.logs.epoch(&logs_path);
        let result = async {
            self.remote.delete(&habits_path, id.as_str()).await?;
            let logs = self.remote.get_all(&logs_path).await?;
            let owned: Vec<&Document> = logs
                .iter()
                .filter(|doc| doc.text(fields::HABIT_ID) == Some(id.as_str()))
                .collect();
            for doc in &owned {
                self.remote.delete(&logs_path, &doc.id).await?;
            }
            Ok::<usize, RemoteError>(owned.len())
        }
        .await;

        match result {
            Ok(log_count) => {
                self.habits.remove(&habit_epoch, id.as_str());
                self.logs.remove_where(&log_epoch, |log| log.habit_id == *id);
                tracing::info!(habit = %id, logs = log_count, "habit deleted");
                Ok(true)
            }
            Err(e) => {
                self.habits.record_error(format!("failed to delete habit: {e}"));
                Err(e.into())
            }
        }
    }

    /// Records one more completion of `habit` on `date`.
    ///
    /// Progress goes 1, 2, ... up to the goal; one more toggle deletes the
    /// day's log and returns 0. Returns the resulting progress.
    ///
    /// # Errors
    ///
    /// Returns [`HabitStoreError::Unauthenticated`] without a user, or
    /// [`HabitStoreError::Remote`] if the write fails (local state is
    /// unchanged).
    pub async fn toggle_completion(
        &self,
        habit: &Habit,
        date: NaiveDate,
        user: Option<&UserId>,
    ) -> Result<u32, HabitStoreError> {
        let user = require_user(user)?;
        let path = CollectionPath::habit_logs(user);
        let now = Utc::now();
        let epoch = self.logs.epoch(&path);

        let existing = self
            .logs
            .find_by(|log| log.habit_id == habit.id && log.date == date);
        let outcome = match existing {
            None => {
                let record = HabitLog::new_record(&habit.id, date, 1, user, now);
                match self.remote.add(&path, record.clone()).await {
                    Ok(id) => {
                        let log = HabitLog::from_document(&Document::new(id, record), now)?;
                        self.logs.upsert(&epoch, log);
                        Ok(1)
                    }
                    Err(e) => Err(e),
                }
            }
            // A log already at (or, from remote data, beyond) the goal wraps.
            Some(log) if log.progress >= habit.goal => {
                match self.remote.delete(&path, log.id.as_str()).await {
                    Ok(()) => {
                        self.logs.remove(&epoch, log.id.as_str());
                        Ok(0)
                    }
                    Err(e) => Err(e),
                }
            }
            Some(log) => {
                let next = log.progress + 1;
                match self
                    .remote
                    .update(&path, log.id.as_str(), HabitLog::progress_record(next, now))
                    .await
                {
                    Ok(()) => {
                        self.logs.modify(&epoch, log.id.as_str(), |l| {
                            l.progress = next;
                            l.updated_at = now;
                        });
                        Ok(next)
                    }
                    Err(e) => Err(e),
                }
            }
        };

        match outcome {
            Ok(progress) => {
                tracing::debug!(habit = %habit.id, %date, progress, "habit toggled");
                Ok(progress)
            }
            Err(e) => {
                self.logs.record_error(format!("failed to update habit progress: {e}"));
                Err(e.into())
            }
        }
    }

    /// Current habits.
    #[must_use]
    pub fn habits(&self) -> Vec<Habit> {
        self.habits.items()
    }

    /// Current logs.
    #[must_use]
    pub fn logs(&self) -> Vec<HabitLog> {
        self.logs.items()
    }

    /// Looks up a habit by id.
    #[must_use]
    pub fn habit(&self, id: &HabitId) -> Option<Habit> {
        self.habits.find(id.as_str())
    }

    /// Logs recorded for one habit, in snapshot order.
    #[must_use]
    pub fn logs_for(&self, habit: &HabitId) -> Vec<HabitLog> {
        self.logs
            .items()
            .into_iter()
            .filter(|log| log.habit_id == *habit)
            .collect()
    }

    /// Progress of `habit` on `date` (0 without a log).
    #[must_use]
    pub fn progress(&self, habit: &HabitId, date: NaiveDate) -> u32 {
        self.logs
            .find_by(|log| log.habit_id == *habit && log.date == date)
            .map_or(0, |log| log.progress)
    }

    /// `true` if the habit reached its goal on `date`.
    #[must_use]
    pub fn is_goal_met(&self, habit: &Habit, date: NaiveDate) -> bool {
        self.progress(&habit.id, date) >= habit.goal
    }

    /// State of the habit collection.
    #[must_use]
    pub fn habit_state(&self) -> SyncState<Habit> {
        self.habits.state()
    }

    /// State of the log collection.
    #[must_use]
    pub fn log_state(&self) -> SyncState<HabitLog> {
        self.logs.state()
    }

    /// Last recorded failure from either collection.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.logs.last_error().or_else(|| self.habits.last_error())
    }

    /// `true` while either collection waits for its first snapshot.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.habits.is_loading() || self.logs.is_loading()
    }

    /// `true` once every local edit has been confirmed by a snapshot.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.habits.is_converged() && self.logs.is_converged()
    }
}

fn require_user(user: Option<&UserId>) -> Result<&UserId, HabitStoreError> {
    user.filter(|u| !u.is_empty())
        .ok_or(HabitStoreError::Unauthenticated)
}
