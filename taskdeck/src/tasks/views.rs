//! Derived task views.
//!
//! Pure selectors over a task slice. They borrow from the slice and keep
//! its relative order, so they can be re-run cheaply on every collection
//! change.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};

use taskdeck_proto::task::{Priority, Task, TaskStatus};

/// Tasks partitioned by status, each column in collection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KanbanBoard<'a> {
    /// `to-do` column.
    pub to_do: Vec<&'a Task>,
    /// `in-progress` column.
    pub in_progress: Vec<&'a Task>,
    /// `completed` column.
    pub completed: Vec<&'a Task>,
}

impl<'a> KanbanBoard<'a> {
    /// Returns the column for `status`.
    #[must_use]
    pub fn column(&self, status: TaskStatus) -> &[&'a Task] {
        match status {
            TaskStatus::ToDo => &self.to_do,
            TaskStatus::InProgress => &self.in_progress,
            TaskStatus::Completed => &self.completed,
        }
    }
}

/// Partitions tasks into board columns.
#[must_use]
pub fn by_status(tasks: &[Task]) -> KanbanBoard<'_> {
    let mut board = KanbanBoard::default();
    for task in tasks {
        match task.status {
            TaskStatus::ToDo => board.to_do.push(task),
            TaskStatus::InProgress => board.in_progress.push(task),
            TaskStatus::Completed => board.completed.push(task),
        }
    }
    board
}

/// Status predicate of a [`TaskFilter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    /// Any status.
    #[default]
    All,
    /// Exactly this status.
    Only(TaskStatus),
}

impl StatusFilter {
    fn matches(self, status: TaskStatus) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == status,
        }
    }
}

/// Priority predicate of a [`TaskFilter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PriorityFilter {
    /// Any priority.
    #[default]
    All,
    /// Exactly this priority.
    Only(Priority),
}

impl PriorityFilter {
    fn matches(self, priority: Priority) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == priority,
        }
    }
}

/// Compound filter; all set predicates must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Status predicate.
    pub status: StatusFilter,
    /// Priority predicate.
    pub priority: PriorityFilter,
    /// Case-insensitive substring of title or description.
    pub text: Option<String>,
}

impl TaskFilter {
    /// Restricts to one status.
    #[must_use]
    pub const fn status(mut self, status: TaskStatus) -> Self {
        self.status = StatusFilter::Only(status);
        self
    }

    /// Restricts to one priority.
    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = PriorityFilter::Only(priority);
        self
    }

    /// Restricts to tasks mentioning `text`. Blank text matches everything.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Returns `true` if `task` passes every predicate.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.status.matches(task.status)
            && self.priority.matches(task.priority)
            && self.text.as_deref().is_none_or(|text| mentions(task, text))
    }
}

fn mentions(task: &Task, text: &str) -> bool {
    let needle = text.trim().to_lowercase();
    needle.is_empty()
        || task.title.to_lowercase().contains(&needle)
        || task.description.to_lowercase().contains(&needle)
}

/// Applies a compound filter.
#[must_use]
pub fn filter_tasks<'a>(tasks: &'a [Task], filter: &TaskFilter) -> Vec<&'a Task> {
    tasks.iter().filter(|t| filter.matches(t)).collect()
}

/// Tasks with the given priority (or all).
#[must_use]
pub fn by_priority(tasks: &[Task], priority: PriorityFilter) -> Vec<&Task> {
    tasks.iter().filter(|t| priority.matches(t.priority)).collect()
}

/// Tasks whose title or description contains `text`, ignoring case.
#[must_use]
pub fn search<'a>(tasks: &'a [Task], text: &str) -> Vec<&'a Task> {
    tasks.iter().filter(|t| mentions(t, text)).collect()
}

/// Per-status and per-priority counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    /// Total number of tasks.
    pub total: usize,
    /// `to-do` tasks.
    pub to_do: usize,
    /// `in-progress` tasks.
    pub in_progress: usize,
    /// `completed` tasks.
    pub completed: usize,
    /// High priority tasks.
    pub high: usize,
    /// Medium priority tasks.
    pub medium: usize,
    /// Low priority tasks.
    pub low: usize,
}

impl TaskCounts {
    /// Count for one status.
    #[must_use]
    pub const fn status(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::ToDo => self.to_do,
            TaskStatus::InProgress => self.in_progress,
            TaskStatus::Completed => self.completed,
        }
    }

    /// Count for one priority.
    #[must_use]
    pub const fn priority(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    /// Share of `status` in `[0, 1]`; 0 for an empty collection.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn share(&self, status: TaskStatus) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.status(status) as f64 / self.total as f64
    }

    /// Completed over total; 0 for an empty collection.
    #[must_use]
    pub fn completion_ratio(&self) -> f64 {
        self.share(TaskStatus::Completed)
    }

    /// Completion ratio as a rounded percentage.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn completion_percent(&self) -> u32 {
        (self.completion_ratio() * 100.0).round() as u32
    }
}

/// Counts tasks per status and per priority.
#[must_use]
pub fn aggregate_counts(tasks: &[Task]) -> TaskCounts {
    let mut counts = TaskCounts {
        total: tasks.len(),
        ..TaskCounts::default()
    };
    for task in tasks {
        match task.status {
            TaskStatus::ToDo => counts.to_do += 1,
            TaskStatus::InProgress => counts.in_progress += 1,
            TaskStatus::Completed => counts.completed += 1,
        }
        match task.priority {
            Priority::High => counts.high += 1,
            Priority::Medium => counts.medium += 1,
            Priority::Low => counts.low += 1,
        }
    }
    counts
}

/// Percentage of the total per status, in [`TaskStatus::ALL`] order.
#[must_use]
pub fn status_shares(tasks: &[Task]) -> Vec<(TaskStatus, f64)> {
    let counts = aggregate_counts(tasks);
    TaskStatus::ALL
        .iter()
        .map(|&status| (status, counts.share(status) * 100.0))
        .collect()
}

/// Tasks due on `date` as seen in `tz`, ignoring time of day.
#[must_use]
pub fn due_on<'a, Tz: TimeZone>(tasks: &'a [Task], date: NaiveDate, tz: &Tz) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|t| {
            t.due_date
                .is_some_and(|due| due.with_timezone(tz).date_naive() == date)
        })
        .collect()
}

/// `true` if the task is not completed and its due time is before `now`.
#[must_use]
pub fn is_overdue(task: &Task, now: DateTime<Utc>) -> bool {
    task.status != TaskStatus::Completed && task.due_date.is_some_and(|due| due < now)
}

/// Tasks that are not completed.
#[must_use]
pub fn active_tasks(tasks: &[Task]) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|t| t.status != TaskStatus::Completed)
        .collect()
}

/// Tasks that are overdue at `now`.
#[must_use]
pub fn overdue_tasks(tasks: &[Task], now: DateTime<Utc>) -> Vec<&Task> {
    tasks.iter().filter(|t| is_overdue(t, now)).collect()
}

/// Completed tasks per day for the `days` days ending on `today`, oldest
/// first. A task counts on the local day of its `completed_at`.
#[must_use]
pub fn completions_by_day<Tz: TimeZone>(
    tasks: &[Task],
    today: NaiveDate,
    days: u32,
    tz: &Tz,
) -> Vec<(NaiveDate, usize)> {
    (0..days)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(u64::from(back))))
        .map(|day| {
            let count = tasks
                .iter()
                .filter(|t| t.completed)
                .filter(|t| {
                    t.completed_at
                        .is_some_and(|at| at.with_timezone(tz).date_naive() == day)
                })
                .count();
            (day, count)
        })
        .collect()
}
