//! Persisted data model for `TaskDeck`.
//!
//! Defines the entities held by the client (tasks, habits, habit logs), the
//! document representation exchanged with the remote store, normalization
//! from raw documents, and the locally persisted Pomodoro and theme state.

pub mod codec;
pub mod document;
pub mod habit;
pub mod ident;
pub mod pomodoro;
pub mod task;
pub mod theme;
pub mod value;

pub use document::{DocumentError, FromDocument};
pub use ident::{HabitId, HabitLogId, TaskId, UserId};
