//! Per-user task management.
//!
//! [`TaskStore`] keeps the signed-in user's task collection synchronized
//! with the remote store and exposes the CRUD operations; [`views`] holds
//! the pure projections (board columns, filters, counts, calendar and
//! analytics selectors) computed from a task slice.

pub mod store;
pub mod views;

pub use store::TaskStore;
pub use views::{KanbanBoard, PriorityFilter, StatusFilter, TaskCounts, TaskFilter};

use thiserror::Error;

use crate::remote::RemoteError;

/// Errors that can occur during task operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskStoreError {
    /// No signed-in user was supplied.
    #[error("user not authenticated")]
    Unauthenticated,
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max {max} characters)")]
    TitleTooLong {
        /// Configured limit.
        max: usize,
    },
    /// The remote store rejected the operation.
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),
}

impl TaskStoreError {
    /// Returns `true` for input validation failures.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::TitleEmpty | Self::TitleTooLong { .. })
    }
}
