//! Task model and its document representation.
//!
//! A task's `completed` flag mirrors `status == Completed` and is always
//! recomputed, never trusted from the stored record. `completed_at` is stamped
//! when a task enters `Completed` and is never cleared afterwards, so history
//! survives a task being reopened.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{DocumentError, FromDocument};
use crate::ident::{TaskId, UserId};
use crate::value::{Document, Record, Value, parse_timestamp_text};

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Record field names used in task documents.
pub mod fields {
    /// Task title.
    pub const TITLE: &str = "title";
    /// Free-form description.
    pub const DESCRIPTION: &str = "description";
    /// Workflow status.
    pub const STATUS: &str = "status";
    /// Priority.
    pub const PRIORITY: &str = "priority";
    /// Mirror of `status == completed`.
    pub const COMPLETED: &str = "completed";
    /// Owning user.
    pub const USER_ID: &str = "userId";
    /// Creation time.
    pub const CREATED_AT: &str = "createdAt";
    /// Last update time.
    pub const UPDATED_AT: &str = "updatedAt";
    /// Optional due time.
    pub const DUE_DATE: &str = "dueDate";
    /// First time the task entered `completed`.
    pub const COMPLETED_AT: &str = "completedAt";
}

/// Error returned when parsing an enum from its wire string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Not started.
    #[default]
    ToDo,
    /// Being worked on.
    InProgress,
    /// Done.
    Completed,
}

impl TaskStatus {
    /// All statuses in board order.
    pub const ALL: [Self; 3] = [Self::ToDo, Self::InProgress, Self::Completed];

    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToDo => "to-do",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "to-do" | "todo" => Ok(Self::ToDo),
            "in-progress" | "in_progress" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(ParseEnumError {
                kind: "task status",
                value: other.to_string(),
            }),
        }
    }
}

/// Priority of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Urgent.
    High,
    /// Default priority.
    #[default]
    Medium,
    /// Can wait.
    Low,
}

impl Priority {
    /// All priorities, highest first.
    pub const ALL: [Self; 3] = [Self::High, Self::Medium, Self::Low];

    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(ParseEnumError {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

/// A normalized task as held in the client collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned identifier.
    pub id: TaskId,
    /// Title (non-empty when created locally).
    pub title: String,
    /// Description, possibly empty.
    pub description: String,
    /// Workflow status.
    pub status: TaskStatus,
    /// Priority.
    pub priority: Priority,
    /// Mirrors `status == Completed`.
    pub completed: bool,
    /// Owning user.
    pub user_id: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Optional due time.
    pub due_date: Option<DateTime<Utc>>,
    /// Set each time the task enters `Completed`; never cleared.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Moves the task to `status`, keeping `completed` and `completed_at`
    /// consistent with the transition.
    pub fn set_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        if let Some(stamp) = completion_stamp(self, status, now) {
            self.completed_at = Some(stamp);
        }
        self.status = status;
        self.completed = status == TaskStatus::Completed;
    }

    /// Merges a patch into the task and refreshes `updated_at`.
    ///
    /// The patch is applied as given; callers that want the completion rule
    /// enforced run [`TaskPatch::synchronize_with`] first.
    pub fn apply_patch(&mut self, patch: &TaskPatch, now: DateTime<Utc>) {
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(description) = &patch.description {
            self.description.clone_from(description);
        }
        if let Some(status) = patch.status {
            self.status = status;
            self.completed = status == TaskStatus::Completed;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due) = patch.due_date {
            self.due_date = due;
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
        self.updated_at = now;
    }
}

/// Returns the `completed_at` stamp a move to `next` should write, if any.
///
/// Only a transition into `Completed` stamps. Writing `Completed` over a
/// task that is already completed keeps its stamp.
fn completion_stamp(task: &Task, next: TaskStatus, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let entering = next == TaskStatus::Completed
        && (task.status != TaskStatus::Completed || task.completed_at.is_none());
    entering.then_some(now)
}

impl FromDocument for Task {
    fn from_document(doc: &Document, now: DateTime<Utc>) -> Result<Self, DocumentError> {
        let status = doc
            .text(fields::STATUS)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        Ok(Self {
            id: TaskId::new(doc.id.clone()),
            title: doc.text(fields::TITLE).unwrap_or_default().to_string(),
            description: doc.text(fields::DESCRIPTION).unwrap_or_default().to_string(),
            status,
            priority: doc
                .text(fields::PRIORITY)
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            completed: status == TaskStatus::Completed,
            user_id: UserId::new(doc.text(fields::USER_ID).unwrap_or_default()),
            created_at: doc.timestamp(fields::CREATED_AT).unwrap_or(now),
            updated_at: doc.timestamp(fields::UPDATED_AT).unwrap_or(now),
            due_date: doc.timestamp(fields::DUE_DATE),
            completed_at: doc.timestamp(fields::COMPLETED_AT),
        })
    }

    fn document_id(&self) -> &str {
        self.id.as_str()
    }
}

/// Due date as entered by a caller: free text from a form, or a timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DueInput {
    /// No due date.
    #[default]
    None,
    /// Unparsed user input (`2024-03-09`, `2024-03-09T17:00`, RFC 3339).
    Text(String),
    /// An already-resolved instant.
    At(DateTime<Utc>),
}

impl DueInput {
    /// Resolves the input to an instant. Unparseable text yields `None`
    /// instead of an error.
    ///
    /// Naive date-times (form `datetime-local` values) are read as UTC.
    #[must_use]
    pub fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::None => None,
            Self::At(ts) => Some(*ts),
            Self::Text(s) => parse_timestamp_text(s).or_else(|| {
                ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
                    .map(|dt| dt.and_utc())
            }),
        }
    }
}

impl From<Option<DateTime<Utc>>> for DueInput {
    fn from(ts: Option<DateTime<Utc>>) -> Self {
        ts.map_or(Self::None, Self::At)
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    /// Title; must be non-blank.
    pub title: String,
    /// Description; may be empty.
    pub description: String,
    /// Initial status.
    pub status: TaskStatus,
    /// Initial priority.
    pub priority: Priority,
    /// Due date input.
    pub due: DueInput,
}

impl TaskDraft {
    /// Creates a draft with defaults (`to-do`, `medium`, no due date).
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the status.
    #[must_use]
    pub const fn status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the due date input.
    #[must_use]
    pub fn due(mut self, due: DueInput) -> Self {
        self.due = due;
        self
    }

    /// Builds the record persisted for a new task.
    ///
    /// `completed` is derived from the status and `completedAt` is stamped
    /// when the task is created already completed.
    #[must_use]
    pub fn to_record(&self, user: &UserId, now: DateTime<Utc>) -> Record {
        let completed = self.status == TaskStatus::Completed;
        let mut record = Record::new();
        record.insert(fields::TITLE.into(), self.title.trim().into());
        record.insert(fields::DESCRIPTION.into(), self.description.clone().into());
        record.insert(fields::STATUS.into(), self.status.as_str().into());
        record.insert(fields::PRIORITY.into(), self.priority.as_str().into());
        record.insert(fields::COMPLETED.into(), completed.into());
        record.insert(fields::USER_ID.into(), user.as_str().into());
        record.insert(fields::CREATED_AT.into(), now.into());
        record.insert(fields::UPDATED_AT.into(), now.into());
        record.insert(fields::DUE_DATE.into(), self.due.resolve().into());
        if completed {
            record.insert(fields::COMPLETED_AT.into(), now.into());
        }
        record
    }
}

/// A partial update to a task. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New status.
    pub status: Option<TaskStatus>,
    /// New priority.
    pub priority: Option<Priority>,
    /// New due date; `Some(None)` clears it.
    pub due_date: Option<Option<DateTime<Utc>>>,
    /// Completion stamp to write.
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    /// A patch that only changes the status.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// A patch that only changes the priority.
    #[must_use]
    pub fn priority(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..Self::default()
        }
    }

    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the completion rule against the task's current state: a
    /// status write into `Completed` stamps `completed_at` unless the caller
    /// already supplied one. Leaving `Completed` never clears the stamp.
    pub fn synchronize_with(&mut self, current: &Task, now: DateTime<Utc>) {
        if self.completed_at.is_some() {
            return;
        }
        if let Some(status) = self.status {
            self.completed_at = completion_stamp(current, status, now);
        }
    }

    /// Builds the record written to the store, including `updatedAt`.
    #[must_use]
    pub fn to_record(&self, now: DateTime<Utc>) -> Record {
        let mut record = Record::new();
        if let Some(title) = &self.title {
            record.insert(fields::TITLE.into(), title.trim().into());
        }
        if let Some(description) = &self.description {
            record.insert(fields::DESCRIPTION.into(), description.clone().into());
        }
        if let Some(status) = self.status {
            record.insert(fields::STATUS.into(), status.as_str().into());
            record.insert(
                fields::COMPLETED.into(),
                Value::Bool(status == TaskStatus::Completed),
            );
        }
        if let Some(priority) = self.priority {
            record.insert(fields::PRIORITY.into(), priority.as_str().into());
        }
        if let Some(due) = self.due_date {
            record.insert(fields::DUE_DATE.into(), due.into());
        }
        if let Some(completed_at) = self.completed_at {
            record.insert(fields::COMPLETED_AT.into(), completed_at.into());
        }
        record.insert(fields::UPDATED_AT.into(), now.into());
        record
    }
}
