//! Pomodoro timer.
//!
//! [`PomodoroTimer`] owns the persisted [`PomodoroState`] and implements the
//! work/break state machine. The session-end notification goes through a
//! [`Notifier`]; its failures are logged and never affect the transition.
//! [`run`] drives the timer from a `tokio` interval.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use taskdeck_proto::TaskId;
use taskdeck_proto::pomodoro::{PomodoroState, SessionKind};

use crate::storage::{self, LocalStorage, StorageError};

/// Storage key of the timer state.
pub const POMODORO_STORAGE_KEY: &str = "pomodoro-storage";

/// Errors from timer configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PomodoroError {
    /// Durations must be at least one minute.
    #[error("session length must be at least 1 minute, got {0}")]
    InvalidDuration(u32),
}

/// Where the timer is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PomodoroPhase {
    /// Not started, or reset.
    Idle,
    /// Counting down a work session.
    WorkRunning,
    /// Work session paused.
    WorkPaused,
    /// Counting down a break.
    BreakRunning,
    /// Break paused.
    BreakPaused,
}

impl PomodoroPhase {
    /// Returns `true` while counting down.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::WorkRunning | Self::BreakRunning)
    }
}

impl std::fmt::Display for PomodoroPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::WorkRunning => "work (running)",
            Self::WorkPaused => "work (paused)",
            Self::BreakRunning => "break (running)",
            Self::BreakPaused => "break (paused)",
        };
        f.write_str(label)
    }
}

/// Message shown when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The session that just finished.
    pub finished: SessionKind,
    /// Short headline.
    pub title: &'static str,
    /// Body text.
    pub body: &'static str,
}

impl Notification {
    /// The notification for the end of `finished`.
    #[must_use]
    pub const fn for_session(finished: SessionKind) -> Self {
        match finished {
            SessionKind::Work => Self {
                finished,
                title: "Break Time!",
                body: "Good job! Take a break.",
            },
            SessionKind::Break => Self {
                finished,
                title: "Work Time!",
                body: "Break is over. Time to focus!",
            },
        }
    }
}

/// Error raised by a [`Notifier`].
#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Session-end side effect (sound, desktop notification, ...).
pub trait Notifier: Send + Sync {
    /// Delivers the notification.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if delivery failed; the timer only logs it.
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            session = %notification.finished,
            title = notification.title,
            "{}",
            notification.body
        );
        Ok(())
    }
}

/// The Pomodoro state machine.
pub struct PomodoroTimer {
    state: PomodoroState,
    notifier: Box<dyn Notifier>,
}

impl PomodoroTimer {
    /// A fresh timer with default durations.
    #[must_use]
    pub fn new() -> Self {
        Self::from_state(PomodoroState::default())
    }

    /// Wraps an existing state.
    #[must_use]
    pub fn from_state(state: PomodoroState) -> Self {
        Self {
            state,
            notifier: Box::new(LogNotifier),
        }
    }

    /// Replaces the session-end notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    /// Restores the timer from local storage; corrupt or missing data gives
    /// a fresh timer.
    #[must_use]
    pub fn load(storage: &dyn LocalStorage) -> Self {
        Self::from_state(storage::load_or_default(storage, POMODORO_STORAGE_KEY))
    }

    /// Persists the timer to local storage.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the state cannot be written.
    pub fn save(&self, storage: &dyn LocalStorage) -> Result<(), StorageError> {
        storage::save(storage, POMODORO_STORAGE_KEY, &self.state)
    }

    /// Current persisted state.
    #[must_use]
    pub const fn state(&self) -> &PomodoroState {
        &self.state
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> PomodoroPhase {
        match (
            self.state.is_active,
            self.state.is_paused,
            self.state.current_session,
        ) {
            (false, _, _) => PomodoroPhase::Idle,
            (true, false, SessionKind::Work) => PomodoroPhase::WorkRunning,
            (true, true, SessionKind::Work) => PomodoroPhase::WorkPaused,
            (true, false, SessionKind::Break) => PomodoroPhase::BreakRunning,
            (true, true, SessionKind::Break) => PomodoroPhase::BreakPaused,
        }
    }

    /// Starts a countdown for the current session kind.
    ///
    /// From idle the countdown starts at the full configured duration and
    /// is attributed to `task`; a paused timer resumes instead; a running
    /// timer is left alone.
    pub fn start(&mut self, task: Option<TaskId>) {
        match self.phase() {
            PomodoroPhase::WorkRunning | PomodoroPhase::BreakRunning => {}
            PomodoroPhase::WorkPaused | PomodoroPhase::BreakPaused => self.resume(),
            PomodoroPhase::Idle => {
                let kind = self.state.current_session;
                self.state.is_active = true;
                self.state.is_paused = false;
                self.state.current_task_id = task;
                self.state.time_remaining = self.state.duration_for(kind);
                tracing::debug!(session = %kind, seconds = self.state.time_remaining, "timer started");
            }
        }
    }

    /// Pauses a running countdown.
    pub fn pause(&mut self) {
        if self.phase().is_running() {
            self.state.is_paused = true;
        }
    }

    /// Resumes a paused countdown from where it stopped.
    pub fn resume(&mut self) {
        if self.state.is_active && self.state.is_paused {
            self.state.is_paused = false;
        }
    }

    /// Back to an idle work session with the full work duration.
    pub fn reset(&mut self) {
        self.state.is_active = false;
        self.state.is_paused = false;
        self.state.current_session = SessionKind::Work;
        self.state.time_remaining = self.state.work_duration;
        self.state.current_task_id = None;
    }

    /// Advances a running countdown by one second.
    ///
    /// Returns the session that finished, if this tick ended one.
    pub fn tick(&mut self) -> Option<SessionKind> {
        if !self.phase().is_running() {
            return None;
        }
        self.state.time_remaining = self.state.time_remaining.saturating_sub(1);
        if self.state.time_remaining == 0 {
            Some(self.complete_session())
        } else {
            None
        }
    }

    /// Ends the current session and switches to the other kind.
    ///
    /// Finishing a work session increments the counter and detaches the
    /// task. The timer keeps its active/paused flags. Returns the session
    /// that finished.
    pub fn complete_session(&mut self) -> SessionKind {
        let finished = self.state.current_session;
        let next = finished.next();
        if finished == SessionKind::Work {
            self.state.completed_sessions += 1;
            self.state.current_task_id = None;
        }
        self.state.current_session = next;
        self.state.time_remaining = self.state.duration_for(next);

        let notification = Notification::for_session(finished);
        if let Err(e) = self.notifier.notify(&notification) {
            tracing::warn!(error = %e, "session notification failed");
        }
        tracing::info!(
            finished = %finished,
            completed = self.state.completed_sessions,
            "session complete"
        );
        finished
    }

    /// Sets the work length. An idle work session shows the new length
    /// immediately; a running countdown is not changed.
    ///
    /// # Errors
    ///
    /// Returns [`PomodoroError::InvalidDuration`] for 0 minutes.
    pub fn set_work_minutes(&mut self, minutes: u32) -> Result<(), PomodoroError> {
        let seconds = to_seconds(minutes)?;
        self.state.work_duration = seconds;
        self.refresh_idle(SessionKind::Work);
        Ok(())
    }

    /// Sets the break length. Same rules as
    /// [`set_work_minutes`](Self::set_work_minutes).
    ///
    /// # Errors
    ///
    /// Returns [`PomodoroError::InvalidDuration`] for 0 minutes.
    pub fn set_break_minutes(&mut self, minutes: u32) -> Result<(), PomodoroError> {
        let seconds = to_seconds(minutes)?;
        self.state.break_duration = seconds;
        self.refresh_idle(SessionKind::Break);
        Ok(())
    }

    fn refresh_idle(&mut self, changed: SessionKind) {
        if !self.state.is_active && self.state.current_session == changed {
            self.state.time_remaining = self.state.duration_for(changed);
        }
    }
}

impl Default for PomodoroTimer {
    fn default() -> Self {
        Self::new()
    }
}

fn to_seconds(minutes: u32) -> Result<u32, PomodoroError> {
    if minutes == 0 {
        return Err(PomodoroError::InvalidDuration(minutes));
    }
    minutes
        .checked_mul(60)
        .ok_or(PomodoroError::InvalidDuration(minutes))
}

/// Formats seconds as `MM:SS`.
#[must_use]
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Ticks `timer` every `period` while it is running.
///
/// Stops when the timer is no longer running, when `shutdown` becomes
/// `true` (or its sender goes away), or when `on_tick` breaks. Returns the
/// number of ticks applied.
pub async fn run<F>(
    timer: &mut PomodoroTimer,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut on_tick: F,
) -> u64
where
    F: FnMut(&PomodoroTimer, Option<SessionKind>) -> ControlFlow<()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    let mut ticks = 0;
    while timer.phase().is_running() && !*shutdown.borrow() {
        tokio::select! {
            _ = interval.tick() => {
                let finished = timer.tick();
                ticks += 1;
                if on_tick(timer, finished).is_break() {
                    break;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!(ticks, phase = %timer.phase(), "timer driver stopped");
    ticks
}
