//! Persisted Pomodoro timer state.
//!
//! The state is a per-session singleton stored locally (not in the remote
//! store). Transition logic lives in the client; this module only defines
//! the shape that is saved and restored.

use serde::{Deserialize, Serialize};

use crate::ident::TaskId;

/// Default work session length (25 minutes).
pub const DEFAULT_WORK_SECS: u32 = 25 * 60;

/// Default break length (5 minutes).
pub const DEFAULT_BREAK_SECS: u32 = 5 * 60;

/// Which kind of session the timer is counting down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Focus time.
    #[default]
    Work,
    /// Rest time.
    Break,
}

impl SessionKind {
    /// The session that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Work => Self::Break,
            Self::Break => Self::Work,
        }
    }

    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Break => "break",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the Pomodoro timer, as persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomodoroState {
    /// A countdown has been started and not reset.
    pub is_active: bool,
    /// The active countdown is paused.
    pub is_paused: bool,
    /// Configured work length in seconds.
    pub work_duration: u32,
    /// Configured break length in seconds.
    pub break_duration: u32,
    /// Session currently shown.
    pub current_session: SessionKind,
    /// Seconds left in the current session.
    pub time_remaining: u32,
    /// Work sessions finished; only ever incremented.
    pub completed_sessions: u32,
    /// Task the current work session is attributed to.
    pub current_task_id: Option<TaskId>,
}

impl PomodoroState {
    /// Configured length of the given session kind, in seconds.
    #[must_use]
    pub const fn duration_for(&self, kind: SessionKind) -> u32 {
        match kind {
            SessionKind::Work => self.work_duration,
            SessionKind::Break => self.break_duration,
        }
    }
}

impl Default for PomodoroState {
    fn default() -> Self {
        Self {
            is_active: false,
            is_paused: false,
            work_duration: DEFAULT_WORK_SECS,
            break_duration: DEFAULT_BREAK_SECS,
            current_session: SessionKind::Work,
            time_remaining: DEFAULT_WORK_SECS,
            completed_sessions: 0,
            current_task_id: None,
        }
    }
}
