//! Habit and habit-log model.
//!
//! A habit has a numeric goal per period. Progress is recorded as one
//! [`HabitLog`] per `(habit, calendar day)`; a log never persists with zero
//! progress.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{DocumentError, FromDocument};
use crate::ident::{HabitId, HabitLogId, UserId};
use crate::task::ParseEnumError;
use crate::value::{DATE_KEY_FORMAT, Document, Record, parse_date_key};

/// Color assigned to habits created without one.
pub const DEFAULT_HABIT_COLOR: &str = "#3B82F6";

/// Record field names used in habit and habit log documents.
pub mod fields {
    /// Habit name.
    pub const NAME: &str = "name";
    /// Target count per period.
    pub const GOAL: &str = "goal";
    /// Period length.
    pub const FREQUENCY: &str = "frequency";
    /// Display color.
    pub const COLOR: &str = "color";
    /// Foreign key from a log to its habit.
    pub const HABIT_ID: &str = "habitId";
    /// Calendar-day key of a log.
    pub const DATE: &str = "date";
    /// Count recorded on that day.
    pub const PROGRESS: &str = "progress";
    /// Owning user.
    pub const USER_ID: &str = "userId";
    /// Creation time.
    pub const CREATED_AT: &str = "createdAt";
    /// Last update time.
    pub const UPDATED_AT: &str = "updatedAt";
}

/// How often a habit's goal resets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Every day.
    #[default]
    Daily,
    /// Every week.
    Weekly,
    /// Every month.
    Monthly,
}

impl Frequency {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(ParseEnumError {
                kind: "frequency",
                value: other.to_string(),
            }),
        }
    }
}

/// A tracked habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    /// Store-assigned identifier.
    pub id: HabitId,
    /// Owning user.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Target count per period, at least 1.
    pub goal: u32,
    /// Period length.
    pub frequency: Frequency,
    /// Display color tag.
    pub color: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl FromDocument for Habit {
    fn from_document(doc: &Document, now: DateTime<Utc>) -> Result<Self, DocumentError> {
        Ok(Self {
            id: HabitId::new(doc.id.clone()),
            user_id: UserId::new(doc.text(fields::USER_ID).unwrap_or_default()),
            name: doc.text(fields::NAME).unwrap_or_default().to_string(),
            goal: clamp_goal(doc.integer(fields::GOAL)),
            frequency: doc
                .text(fields::FREQUENCY)
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            color: doc
                .text(fields::COLOR)
                .unwrap_or(DEFAULT_HABIT_COLOR)
                .to_string(),
            created_at: doc.timestamp(fields::CREATED_AT).unwrap_or(now),
            updated_at: doc.timestamp(fields::UPDATED_AT).unwrap_or(now),
        })
    }

    fn document_id(&self) -> &str {
        self.id.as_str()
    }
}

/// Goals below 1 (or missing) become 1.
fn clamp_goal(raw: Option<i64>) -> u32 {
    raw.and_then(|g| u32::try_from(g).ok()).unwrap_or(1).max(1)
}

/// Input for creating a habit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitDraft {
    /// Display name; must be non-blank.
    pub name: String,
    /// Target count per period; values below 1 are raised to 1.
    pub goal: u32,
    /// Period length.
    pub frequency: Frequency,
    /// Display color tag.
    pub color: String,
}

impl HabitDraft {
    /// A daily habit with goal 1 and the default color.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            goal: 1,
            frequency: Frequency::Daily,
            color: DEFAULT_HABIT_COLOR.to_string(),
        }
    }

    /// Sets the goal.
    #[must_use]
    pub const fn goal(mut self, goal: u32) -> Self {
        self.goal = goal;
        self
    }

    /// Sets the frequency.
    #[must_use]
    pub const fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    /// Builds the record persisted for a new habit.
    #[must_use]
    pub fn to_record(&self, user: &UserId, now: DateTime<Utc>) -> Record {
        let mut record = Record::new();
        record.insert(fields::NAME.into(), self.name.trim().into());
        record.insert(fields::GOAL.into(), self.goal.max(1).into());
        record.insert(fields::FREQUENCY.into(), self.frequency.as_str().into());
        record.insert(fields::COLOR.into(), self.color.clone().into());
        record.insert(fields::USER_ID.into(), user.as_str().into());
        record.insert(fields::CREATED_AT.into(), now.into());
        record.insert(fields::UPDATED_AT.into(), now.into());
        record
    }
}

/// Progress recorded for one habit on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitLog {
    /// Store-assigned identifier.
    pub id: HabitLogId,
    /// Habit this log belongs to.
    pub habit_id: HabitId,
    /// Calendar day (no time component).
    pub date: NaiveDate,
    /// Count recorded that day, at least 1 while persisted.
    pub progress: u32,
    /// Owning user.
    pub user_id: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl HabitLog {
    /// Builds the record for a new log.
    #[must_use]
    pub fn new_record(
        habit: &HabitId,
        date: NaiveDate,
        progress: u32,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Record {
        let mut record = Record::new();
        record.insert(fields::HABIT_ID.into(), habit.as_str().into());
        record.insert(fields::DATE.into(), date.into());
        record.insert(fields::PROGRESS.into(), progress.into());
        record.insert(fields::USER_ID.into(), user.as_str().into());
        record.insert(fields::CREATED_AT.into(), now.into());
        record.insert(fields::UPDATED_AT.into(), now.into());
        record
    }

    /// Builds the patch record for a progress change.
    #[must_use]
    pub fn progress_record(progress: u32, now: DateTime<Utc>) -> Record {
        let mut record = Record::new();
        record.insert(fields::PROGRESS.into(), progress.into());
        record.insert(fields::UPDATED_AT.into(), now.into());
        record
    }

    /// Returns the calendar-day key (`YYYY-MM-DD`).
    #[must_use]
    pub fn date_key(&self) -> String {
        self.date.format(DATE_KEY_FORMAT).to_string()
    }
}

impl FromDocument for HabitLog {
    fn from_document(doc: &Document, now: DateTime<Utc>) -> Result<Self, DocumentError> {
        let habit_id = doc
            .text(fields::HABIT_ID)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| DocumentError::MissingField {
                id: doc.id.clone(),
                field: fields::HABIT_ID,
            })?;
        let raw_date = doc.text(fields::DATE).ok_or_else(|| DocumentError::MissingField {
            id: doc.id.clone(),
            field: fields::DATE,
        })?;
        let date = parse_date_key(raw_date).ok_or_else(|| DocumentError::InvalidField {
            id: doc.id.clone(),
            field: fields::DATE,
            reason: format!("expected YYYY-MM-DD, got {raw_date:?}"),
        })?;
        let progress = doc
            .integer(fields::PROGRESS)
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(0);
        Ok(Self {
            id: HabitLogId::new(doc.id.clone()),
            habit_id: HabitId::new(habit_id),
            date,
            progress,
            user_id: UserId::new(doc.text(fields::USER_ID).unwrap_or_default()),
            created_at: doc.timestamp(fields::CREATED_AT).unwrap_or(now),
            updated_at: doc.timestamp(fields::UPDATED_AT).unwrap_or(now),
        })
    }

    fn document_id(&self) -> &str {
        self.id.as_str()
    }
}
