//! Domain model that mirrors the `crime` table. `Crime` stays a plain data
//! holder: every value handed out by the store or an editor is an owned
//! snapshot, so callers can clone and keep them around without ever touching
//! the database behind the store's back.

use std::fmt;

use chrono::{DateTime, NaiveTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One recorded crime. The layout matches the columns of the `crime` table one
/// to one.
pub struct Crime {
    /// Primary key. Assigned once when the crime is created and never changed
    /// afterwards; the store refuses to let a transform rewrite it.
    pub id: Uuid,
    /// Short description typed by the user. Empty while the crime is new.
    pub title: String,
    /// When the crime happened. Stored as epoch nanoseconds, which limits it
    /// to the years 1677 through 2262.
    pub date: DateTime<Utc>,
    /// Whether the case is closed.
    pub is_solved: bool,
    /// Name picked for the suspect, empty when nobody has been chosen.
    pub suspect: String,
}

impl Crime {
    /// Build the blank record the list screen inserts when the user asks for a
    /// new crime: random id, empty title, current time, unsolved, no suspect.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: String::new(),
            date: Utc::now(),
            is_solved: false,
            suspect: String::new(),
        }
    }

    /// Keep the calendar day of `date` but move it to `time` (UTC). Seconds
    /// and fractions come from `time`, so a picker that only offers hours and
    /// minutes lands on the whole minute.
    pub fn with_time_of_day(self, time: NaiveTime) -> Self {
        let date = self.date.date_naive().and_time(time).and_utc();
        Self { date, ..self }
    }

    /// Whether a suspect has been named. Whitespace-only names count as none.
    pub fn has_suspect(&self) -> bool {
        !self.suspect.trim().is_empty()
    }
}

impl Default for Crime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Crime {
    /// Titles are allowed to be empty, which would leave list rows blank, so
    /// a placeholder is written instead.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.title.is_empty() {
            write!(f, "(untitled)")
        } else {
            write!(f, "{}", self.title)
        }
    }
}
