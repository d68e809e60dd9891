//! Command-line front-end.
//!
//! Each invocation loads the user's collections with a one-shot fetch, runs
//! one [`Command`] against the stores and prints the result. Output goes to
//! any [`Write`] so commands can be exercised without a terminal.

use std::io::Write;
use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use tokio::sync::watch;

use taskdeck_proto::habit::{Frequency, HabitDraft};
use taskdeck_proto::task::{DueInput, Priority, Task, TaskDraft, TaskPatch, TaskStatus};
use taskdeck_proto::{HabitId, TaskId, UserId};

use crate::config::{ClientConfig, ConfigError};
use crate::habits::{self, HabitStore, HabitStoreError};
use crate::pomodoro::{self, POMODORO_STORAGE_KEY, PomodoroError, PomodoroTimer};
use crate::remote::{RemoteError, RemoteStore};
use crate::storage::{LocalStorage, StorageError};
use crate::tasks::views::{self, TaskFilter};
use crate::tasks::{TaskStore, TaskStoreError};
use crate::theme::ThemeStore;

/// Errors surfaced to the user by a command.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The command needs a signed-in user.
    #[error("no user selected (use --user or [session] user_id)")]
    NoUser,
    /// The referenced record does not exist.
    #[error("no {kind} with id {id}")]
    NotFound {
        /// Record kind.
        kind: &'static str,
        /// Requested id.
        id: String,
    },
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Remote store error.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// Task operation failed.
    #[error(transparent)]
    Tasks(#[from] TaskStoreError),
    /// Habit operation failed.
    #[error(transparent)]
    Habits(#[from] HabitStoreError),
    /// Timer configuration rejected.
    #[error(transparent)]
    Pomodoro(#[from] PomodoroError),
    /// Local state could not be saved.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Writing output failed.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level commands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Manage tasks.
    #[command(subcommand)]
    Tasks(TaskCommand),
    /// Show tasks as board columns.
    Board,
    /// Show task statistics.
    Stats {
        /// Days of completion history to show.
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// List tasks due on a day.
    Calendar {
        /// Day to show (`YYYY-MM-DD`).
        date: NaiveDate,
    },
    /// Track habits.
    #[command(subcommand)]
    Habits(HabitCommand),
    /// Control the Pomodoro timer.
    #[command(subcommand)]
    Pomodoro(PomodoroCommand),
    /// Show or change the theme.
    #[command(subcommand)]
    Theme(ThemeCommand),
}

/// `tasks` subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TaskCommand {
    /// List tasks, optionally filtered.
    List {
        /// Only this status.
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Only this priority.
        #[arg(long)]
        priority: Option<Priority>,
        /// Case-insensitive text in title or description.
        #[arg(long)]
        search: Option<String>,
        /// Only overdue tasks.
        #[arg(long)]
        overdue: bool,
    },
    /// Create a task.
    Add {
        /// Task title.
        title: String,
        /// Longer description.
        #[arg(long, default_value = "")]
        description: String,
        /// Initial status.
        #[arg(long, default_value = "to-do")]
        status: TaskStatus,
        /// Priority.
        #[arg(long, default_value = "medium")]
        priority: Priority,
        /// Due date (`YYYY-MM-DD`, `YYYY-MM-DDTHH:MM` or RFC 3339).
        #[arg(long)]
        due: Option<String>,
    },
    /// Edit a task's text or due date.
    Update {
        /// Task id.
        id: String,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New description.
        #[arg(long)]
        description: Option<String>,
        /// New due date.
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        /// Remove the due date.
        #[arg(long)]
        clear_due: bool,
    },
    /// Move a task to another status.
    Status {
        /// Task id.
        id: String,
        /// New status.
        status: TaskStatus,
    },
    /// Change a task's priority.
    Priority {
        /// Task id.
        id: String,
        /// New priority.
        priority: Priority,
    },
    /// Complete a task, or reopen a completed one.
    Toggle {
        /// Task id.
        id: String,
    },
    /// Delete a task.
    Delete {
        /// Task id.
        id: String,
    },
}

/// `habits` subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum HabitCommand {
    /// List habits with progress for a day and its week.
    List {
        /// Day to show (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Create a habit.
    Add {
        /// Habit name.
        name: String,
        /// Completions per period.
        #[arg(long, default_value_t = 1)]
        goal: u32,
        /// Period.
        #[arg(long, default_value = "daily")]
        frequency: Frequency,
        /// Color tag.
        #[arg(long)]
        color: Option<String>,
    },
    /// Record one completion; past the goal the day resets to zero.
    Toggle {
        /// Habit id.
        id: String,
        /// Day to record (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Delete a habit and its history.
    Delete {
        /// Habit id.
        id: String,
    },
}

/// `pomodoro` subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum PomodoroCommand {
    /// Show the timer.
    Status,
    /// Start or resume the timer.
    Start {
        /// Task to attribute the work session to.
        #[arg(long)]
        task: Option<String>,
    },
    /// Pause the timer.
    Pause,
    /// Back to an idle work session.
    Reset,
    /// Change session lengths (minutes).
    Durations {
        /// Work session length.
        #[arg(long)]
        work: Option<u32>,
        /// Break session length.
        #[arg(long = "break")]
        break_minutes: Option<u32>,
    },
    /// Run the current session in the foreground until it ends.
    Run,
}

/// `theme` subcommands.
#[derive(clap::Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeCommand {
    /// Print the current mode.
    Show,
    /// Switch between light and dark.
    Toggle,
}

/// Stores and settings shared by every command of one invocation.
pub struct Session<R> {
    user: Option<UserId>,
    tasks: TaskStore<R>,
    habits: HabitStore<R>,
    storage: Arc<dyn LocalStorage>,
    config: ClientConfig,
    shutdown: watch::Receiver<bool>,
}

impl<R: RemoteStore> Session<R> {
    /// Builds the stores over `remote` and `storage`.
    ///
    /// `shutdown` stops a foreground timer run when it becomes `true`.
    pub fn new(
        remote: Arc<R>,
        storage: Arc<dyn LocalStorage>,
        config: ClientConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            user: config.user_id.clone(),
            tasks: TaskStore::new(Arc::clone(&remote)).with_max_title_len(config.max_task_title_len),
            habits: HabitStore::new(remote),
            storage,
            config,
            shutdown,
        }
    }

    /// The task store.
    #[must_use]
    pub const fn tasks(&self) -> &TaskStore<R> {
        &self.tasks
    }

    /// The habit store.
    #[must_use]
    pub const fn habits(&self) -> &HabitStore<R> {
        &self.habits
    }

    /// Runs one command, writing its output to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] if the command fails or output cannot be written.
    pub async fn execute(&self, command: Command, out: &mut impl Write) -> Result<(), CliError> {
        match command {
            Command::Tasks(cmd) => self.tasks_command(cmd, out).await,
            Command::Board => self.board(out).await,
            Command::Stats { days } => self.stats(days, out).await,
            Command::Calendar { date } => self.calendar(date, out).await,
            Command::Habits(cmd) => self.habits_command(cmd, out).await,
            Command::Pomodoro(cmd) => self.pomodoro_command(cmd, out).await,
            Command::Theme(cmd) => self.theme_command(cmd, out),
        }
    }

    fn user(&self) -> Result<&UserId, CliError> {
        self.user.as_ref().ok_or(CliError::NoUser)
    }

    async fn load_tasks(&self) -> Result<Vec<Task>, CliError> {
        Ok(self.tasks.fetch(self.user()?).await?)
    }

    // --- tasks ---

    async fn tasks_command(&self, cmd: TaskCommand, out: &mut impl Write) -> Result<(), CliError> {
        let tasks = self.load_tasks().await?;
        let user = Some(self.user()?);
        match cmd {
            TaskCommand::List {
                status,
                priority,
                search,
                overdue,
            } => {
                let mut filter = TaskFilter::default();
                if let Some(status) = status {
                    filter = filter.status(status);
                }
                if let Some(priority) = priority {
                    filter = filter.priority(priority);
                }
                if let Some(text) = search {
                    filter = filter.text(text);
                }
                let now = Utc::now();
                let shown: Vec<&Task> = views::filter_tasks(&tasks, &filter)
                    .into_iter()
                    .filter(|t| !overdue || views::is_overdue(t, now))
                    .collect();
                for task in &shown {
                    self.write_task(task, out)?;
                }
                writeln!(out, "{} of {} tasks", shown.len(), tasks.len())?;
            }
            TaskCommand::Add {
                title,
                description,
                status,
                priority,
                due,
            } => {
                let draft = TaskDraft::new(title)
                    .description(description)
                    .status(status)
                    .priority(priority)
                    .due(due.map_or(DueInput::None, DueInput::Text));
                let task = self.tasks.add(draft, user).await?;
                write!(out, "added ")?;
                self.write_task(&task, out)?;
            }
            TaskCommand::Update {
                id,
                title,
                description,
                due,
                clear_due,
            } => {
                let due_date = if clear_due {
                    Some(None)
                } else {
                    due.map(|text| DueInput::Text(text).resolve())
                };
                let patch = TaskPatch {
                    title,
                    description,
                    due_date,
                    ..TaskPatch::default()
                };
                let task = self.tasks.update(&TaskId::new(&id), patch, user).await?;
                self.write_updated(task, &id, out)?;
            }
            TaskCommand::Status { id, status } => {
                let task = self.tasks.set_status(&TaskId::new(&id), status, user).await?;
                self.write_updated(task, &id, out)?;
            }
            TaskCommand::Priority { id, priority } => {
                let task = self
                    .tasks
                    .set_priority(&TaskId::new(&id), priority, user)
                    .await?;
                self.write_updated(task, &id, out)?;
            }
            TaskCommand::Toggle { id } => {
                let task = self.tasks.toggle_completion(&TaskId::new(&id), user).await?;
                self.write_updated(task, &id, out)?;
            }
            TaskCommand::Delete { id } => {
                let id = TaskId::new(id);
                if self.tasks.get(&id).is_none() {
                    return Err(not_found("task", id.as_str()));
                }
                self.tasks.delete(&id, user).await?;
                writeln!(out, "deleted {id}")?;
            }
        }
        Ok(())
    }

    async fn board(&self, out: &mut impl Write) -> Result<(), CliError> {
        let tasks = self.load_tasks().await?;
        let board = views::by_status(&tasks);
        for status in TaskStatus::ALL {
            let column = board.column(status);
            writeln!(out, "== {status} ({}) ==", column.len())?;
            for task in column {
                self.write_task(task, out)?;
            }
        }
        Ok(())
    }

    async fn stats(&self, days: u32, out: &mut impl Write) -> Result<(), CliError> {
        let tasks = self.load_tasks().await?;
        let counts = views::aggregate_counts(&tasks);
        writeln!(
            out,
            "total {}  completed {}%  overdue {}",
            counts.total,
            counts.completion_percent(),
            views::overdue_tasks(&tasks, Utc::now()).len()
        )?;
        for (status, share) in views::status_shares(&tasks) {
            writeln!(out, "  {status:<12}{:>4}  {share:>5.1}%", counts.status(status))?;
        }
        for priority in Priority::ALL {
            writeln!(out, "  {priority:<12}{:>4}", counts.priority(priority))?;
        }
        let today = habits::today_local();
        for (day, completed) in views::completions_by_day(&tasks, today, days, &Local) {
            writeln!(out, "  {}  {completed}", day.format(&self.config.date_format))?;
        }
        Ok(())
    }

    async fn calendar(&self, date: NaiveDate, out: &mut impl Write) -> Result<(), CliError> {
        let tasks = self.load_tasks().await?;
        let due = views::due_on(&tasks, date, &Local);
        writeln!(out, "{}: {} due", date.format(&self.config.date_format), due.len())?;
        for task in due {
            self.write_task(task, out)?;
        }
        Ok(())
    }

    fn write_task(&self, task: &Task, out: &mut impl Write) -> Result<(), CliError> {
        write!(
            out,
            "{}  [{:<11}] {:<6} {}",
            task.id, task.status, task.priority, task.title
        )?;
        if let Some(due) = task.due_date {
            write!(out, "  (due {})", self.format_time(due))?;
        }
        writeln!(out)?;
        Ok(())
    }

    fn write_updated(
        &self,
        task: Option<Task>,
        id: &str,
        out: &mut impl Write,
    ) -> Result<(), CliError> {
        let task = task.ok_or_else(|| not_found("task", id))?;
        write!(out, "updated ")?;
        self.write_task(&task, out)
    }

    fn format_time(&self, at: DateTime<Utc>) -> impl std::fmt::Display + '_ {
        at.with_timezone(&Local).format(&self.config.date_format)
    }

    // --- habits ---

    async fn habits_command(&self, cmd: HabitCommand, out: &mut impl Write) -> Result<(), CliError> {
        let user = self.user()?;
        self.habits.fetch(user).await?;
        match cmd {
            HabitCommand::List { date } => {
                let day = date.unwrap_or_else(habits::today_local);
                let week = habits::week_dates(day);
                let habits = self.habits.habits();
                for habit in &habits {
                    let marks: String = week
                        .iter()
                        .map(|d| if self.habits.is_goal_met(habit, *d) { 'x' } else { '.' })
                        .collect();
                    writeln!(
                        out,
                        "{}  {:<20} {}/{} {}  [{marks}]",
                        habit.id,
                        habit.name,
                        self.habits.progress(&habit.id, day),
                        habit.goal,
                        habit.frequency,
                    )?;
                }
                writeln!(out, "{} habits", habits.len())?;
            }
            HabitCommand::Add {
                name,
                goal,
                frequency,
                color,
            } => {
                let mut draft = HabitDraft::new(name).goal(goal).frequency(frequency);
                if let Some(color) = color {
                    draft.color = color;
                }
                let habit = self.habits.add_habit(draft, Some(user)).await?;
                writeln!(out, "added {}  {} (goal {})", habit.id, habit.name, habit.goal)?;
            }
            HabitCommand::Toggle { id, date } => {
                let habit = self
                    .habits
                    .habit(&HabitId::new(&id))
                    .ok_or_else(|| not_found("habit", &id))?;
                let day = date.unwrap_or_else(habits::today_local);
                let progress = self.habits.toggle_completion(&habit, day, Some(user)).await?;
                writeln!(out, "{}: {progress}/{}", habit.name, habit.goal)?;
            }
            HabitCommand::Delete { id } => {
                if !self.habits.delete_habit(&HabitId::new(&id), Some(user)).await? {
                    return Err(not_found("habit", id));
                }
                writeln!(out, "deleted {id}")?;
            }
        }
        Ok(())
    }

    // --- pomodoro ---

    fn load_timer(&self) -> Result<PomodoroTimer, CliError> {
        let fresh = self.storage.get(POMODORO_STORAGE_KEY)?.is_none();
        let mut timer = PomodoroTimer::load(self.storage.as_ref());
        if fresh {
            if let Some(minutes) = self.config.work_minutes {
                timer.set_work_minutes(minutes)?;
            }
            if let Some(minutes) = self.config.break_minutes {
                timer.set_break_minutes(minutes)?;
            }
        }
        Ok(timer)
    }

    async fn pomodoro_command(
        &self,
        cmd: PomodoroCommand,
        out: &mut impl Write,
    ) -> Result<(), CliError> {
        let mut timer = self.load_timer()?;
        match cmd {
            PomodoroCommand::Status => {}
            PomodoroCommand::Start { task } => timer.start(task.map(TaskId::new)),
            PomodoroCommand::Pause => timer.pause(),
            PomodoroCommand::Reset => timer.reset(),
            PomodoroCommand::Durations {
                work,
                break_minutes,
            } => {
                if let Some(minutes) = work {
                    timer.set_work_minutes(minutes)?;
                }
                if let Some(minutes) = break_minutes {
                    timer.set_break_minutes(minutes)?;
                }
            }
            PomodoroCommand::Run => {
                timer.start(None);
                let mut write_error = None;
                pomodoro::run(
                    &mut timer,
                    self.config.tick,
                    self.shutdown.clone(),
                    |timer, finished| {
                        let line = finished.map_or_else(
                            || pomodoro::format_clock(timer.state().time_remaining),
                            |kind| format!("{kind} session finished"),
                        );
                        if let Err(e) = writeln!(out, "{line}") {
                            write_error = Some(e);
                            return ControlFlow::Break(());
                        }
                        if finished.is_some() {
                            ControlFlow::Break(())
                        } else {
                            ControlFlow::Continue(())
                        }
                    },
                )
                .await;
                if let Some(e) = write_error {
                    return Err(e.into());
                }
            }
        }
        timer.save(self.storage.as_ref())?;
        let state = timer.state();
        writeln!(
            out,
            "{} {}  sessions {}  (work {}m, break {}m)",
            timer.phase(),
            pomodoro::format_clock(state.time_remaining),
            state.completed_sessions,
            state.work_duration / 60,
            state.break_duration / 60,
        )?;
        Ok(())
    }

    // --- theme ---

    fn theme_command(&self, cmd: ThemeCommand, out: &mut impl Write) -> Result<(), CliError> {
        let mut theme = ThemeStore::load(self.storage.as_ref());
        let dark = match cmd {
            ThemeCommand::Show => theme.initialize(self.config.prefer_dark)?,
            ThemeCommand::Toggle => theme.toggle(self.config.prefer_dark)?,
        };
        writeln!(out, "{}", if dark { "dark" } else { "light" })?;
        Ok(())
    }
}

fn not_found(kind: &'static str, id: impl Into<String>) -> CliError {
    CliError::NotFound {
        kind,
        id: id.into(),
    }
}
