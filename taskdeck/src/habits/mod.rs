//! Habit tracking.
//!
//! [`HabitStore`] synchronizes the user's habits and their daily progress
//! logs. Logs are keyed by calendar day; the caller decides which day is
//! "today" (usually the local day, see [`today_local`]).

pub mod store;

pub use store::HabitStore;

use chrono::{Datelike, Days, Local, NaiveDate};
use thiserror::Error;

use taskdeck_proto::DocumentError;

use crate::remote::RemoteError;

/// Errors that can occur during habit operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HabitStoreError {
    /// No signed-in user was supplied.
    #[error("user not authenticated")]
    Unauthenticated,
    /// Habit name cannot be empty.
    #[error("habit name cannot be empty")]
    NameEmpty,
    /// The remote store rejected the operation.
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),
    /// A freshly written record could not be read back.
    #[error("invalid habit record: {0}")]
    Document(#[from] DocumentError),
}

/// The local calendar day.
#[must_use]
pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}

/// The seven days of the Sunday-first week containing `today`.
#[must_use]
pub fn week_dates(today: NaiveDate) -> Vec<NaiveDate> {
    let offset = u64::from(today.weekday().num_days_from_sunday());
    let Some(sunday) = today.checked_sub_days(Days::new(offset)) else {
        return vec![today];
    };
    (0..7)
        .filter_map(|i| sunday.checked_add_days(Days::new(i)))
        .collect()
}
