//! Task status lifecycle: per-assignee transitions, aggregation to a
//! task-level status, and deadline arithmetic.
//!
//! Everything here is pure. The store calls [`aggregate_status`] after every
//! assignee change and persists the result on the task row.

use std::sync::OnceLock;

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Status of a task or of one assignee's part in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started yet.
    Pending,
    /// Work is under way.
    InProgress,
    /// Done.
    Completed,
    /// Withdrawn, declined, or cancelled by the system.
    Cancelled,
}

impl TaskStatus {
    /// All statuses in display order.
    pub const ALL: [TaskStatus; 4] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(StoreError::InvalidEnum {
                field: "status",
                value: other.to_owned(),
            }),
        }
    }

    /// Completed and cancelled tasks are archived and never reminded.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Human-readable label with an icon.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "\u{23F3} Pending",
            Self::InProgress => "\u{1F504} In progress",
            Self::Completed => "\u{2705} Completed",
            Self::Cancelled => "\u{274C} Cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses a worker may pick for their own assignment.
pub const WORKER_CHOICES: [TaskStatus; 3] = [
    TaskStatus::Pending,
    TaskStatus::InProgress,
    TaskStatus::Completed,
];

/// Outcome of checking an assignee status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The change is allowed.
    Allowed,
    /// The new status equals the current one.
    Unchanged,
    /// The change is not allowed.
    Rejected(&'static str),
}

/// Check whether an assignee may move from `from` to `to` by their own hand.
///
/// Workers move freely among pending, in progress and completed. Cancelled is
/// reached only through declining or a system action, and is terminal.
pub fn check_assignee_transition(from: TaskStatus, to: TaskStatus) -> Transition {
    if from == to {
        return Transition::Unchanged;
    }
    if from == TaskStatus::Cancelled {
        return Transition::Rejected("this assignment was cancelled");
    }
    if to == TaskStatus::Cancelled {
        return Transition::Rejected("use decline to withdraw from a task");
    }
    Transition::Allowed
}

/// Aggregate per-assignee statuses into the task status.
///
/// Rules, first match wins:
/// 1. no assignees: pending
/// 2. all completed: completed
/// 3. any in progress: in progress
/// 4. all cancelled: cancelled
/// 5. anything else: pending
pub fn aggregate_status(statuses: &[TaskStatus]) -> TaskStatus {
    if statuses.is_empty() {
        return TaskStatus::Pending;
    }
    if statuses.iter().all(|s| *s == TaskStatus::Completed) {
        return TaskStatus::Completed;
    }
    if statuses.contains(&TaskStatus::InProgress) {
        return TaskStatus::InProgress;
    }
    if statuses.iter().all(|s| *s == TaskStatus::Cancelled) {
        return TaskStatus::Cancelled;
    }
    TaskStatus::Pending
}

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

fn time_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([0-1]?[0-9]|2[0-4]):([0-5][0-9])$").ok())
        .as_ref()
}

/// Parse a due date in `YYYY-MM-DD` form.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] for malformed dates.
pub fn parse_due_date(input: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| StoreError::Validation(format!("invalid date '{input}', expected YYYY-MM-DD")))
}

/// Parse a due time and normalise it to `HH:MM`.
///
/// Accepts `H:MM` and `HH:MM` with hours 0 through 24. `24:MM` is only valid
/// as `24:00`, meaning the end of the day.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] for malformed times.
pub fn parse_due_time(input: &str) -> Result<String, StoreError> {
    let trimmed = input.trim();
    let invalid = || StoreError::Validation(format!("invalid time '{trimmed}', expected HH:MM"));

    let caps = time_pattern()
        .and_then(|re| re.captures(trimmed))
        .ok_or_else(invalid)?;
    let hour: u32 = caps
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(invalid)?;
    let minute: u32 = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(invalid)?;

    if hour == 24 && minute != 0 {
        return Err(invalid());
    }
    Ok(format!("{hour:02}:{minute:02}"))
}

/// Combine a stored due date and time into a local naive datetime.
///
/// `24:00` resolves to midnight of the following day.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] if either part is malformed.
pub fn due_datetime(date: &str, time: &str) -> Result<NaiveDateTime, StoreError> {
    let day = parse_due_date(date)?;
    let normalised = parse_due_time(time)?;
    if normalised == "24:00" {
        let next = day
            .checked_add_days(Days::new(1))
            .ok_or_else(|| StoreError::Validation(format!("date out of range: {date}")))?;
        return Ok(next.and_time(NaiveTime::MIN));
    }
    let t = NaiveTime::parse_from_str(&normalised, "%H:%M")
        .map_err(|_| StoreError::Validation(format!("invalid time '{time}'")))?;
    Ok(day.and_time(t))
}

/// Minutes in one overdue day.
const MINUTES_PER_DAY: i64 = 1440;

/// Decide whether an overdue reminder is due for a task at `now`.
///
/// Returns the whole number of hours overdue when the task is past its
/// deadline and `now` falls within the first hour of an overdue day.
/// Final tasks are never reminded.
pub fn overdue_reminder(status: TaskStatus, due: NaiveDateTime, now: NaiveDateTime) -> Option<i64> {
    if status.is_final() || now <= due {
        return None;
    }
    let minutes = now.signed_duration_since(due).num_minutes();
    let into_day = minutes.checked_rem(MINUTES_PER_DAY)?;
    if into_day >= 60 {
        return None;
    }
    minutes.checked_div(60)
}
