//! crates/socrates_core/src/scheduler.rs
//!
//! The Review Scheduler: a fixed five-stage spaced-repetition table and the
//! pure transitions over `ReviewSchedule`.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::cmp::Ordering;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ErrorRecord, ReviewOutcome, ReviewSchedule};

//=========================================================================================
// The Stage Table
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageInfo {
    pub stage: u8,
    pub name: &'static str,
    pub offset_days: i64,
}

/// Offsets from the transition time to the next due date. Stage 5 is terminal.
pub const REVIEW_STAGES: [StageInfo; 5] = [
    StageInfo { stage: 1, name: "first review", offset_days: 1 },
    StageInfo { stage: 2, name: "second review", offset_days: 3 },
    StageInfo { stage: 3, name: "third review", offset_days: 7 },
    StageInfo { stage: 4, name: "fourth review", offset_days: 15 },
    StageInfo { stage: 5, name: "mastered", offset_days: 30 },
];

/// A position in `REVIEW_STAGES`, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stage(u8);

impl Stage {
    pub const FIRST: Stage = Stage(1);
    pub const MASTERED: Stage = Stage(5);

    pub fn new(value: u8) -> Option<Self> {
        (1..=REVIEW_STAGES.len() as u8)
            .contains(&value)
            .then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn info(self) -> &'static StageInfo {
        &REVIEW_STAGES[usize::from(self.0 - 1)]
    }

    pub fn offset(self) -> Duration {
        Duration::days(self.info().offset_days)
    }

    pub fn next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    pub fn is_terminal(self) -> bool {
        self == Self::MASTERED
    }
}

//=========================================================================================
// Transitions
//=========================================================================================

/// A fresh schedule at stage 1, due one day after `now`.
pub fn create_schedule(record: &ErrorRecord, now: DateTime<Utc>) -> ReviewSchedule {
    ReviewSchedule {
        id: Uuid::new_v4(),
        error_id: record.id,
        student_id: record.student_id,
        stage: Stage::FIRST,
        next_due_at: Some(now + Stage::FIRST.offset()),
        completed: false,
        updated_at: now,
    }
}

/// Applies one review outcome and returns the resulting schedule.
///
/// Completed schedules come back unchanged.
pub fn record_outcome(
    schedule: &ReviewSchedule,
    outcome: ReviewOutcome,
    now: DateTime<Utc>,
) -> ReviewSchedule {
    if schedule.completed {
        debug!(schedule_id = %schedule.id, "Review on a completed schedule ignored.");
        return schedule.clone();
    }

    let mut next = schedule.clone();
    next.updated_at = now;

    match outcome {
        ReviewOutcome::Correct => match schedule.stage.next() {
            Some(stage) if stage.is_terminal() => {
                next.stage = stage;
                next.next_due_at = None;
                next.completed = true;
            }
            Some(stage) => {
                next.stage = stage;
                next.next_due_at = Some(now + stage.offset());
            }
            // Only reachable for a stage-5 row that was never flagged completed.
            None => {
                next.next_due_at = None;
                next.completed = true;
            }
        },
        ReviewOutcome::Incorrect => {
            next.stage = Stage::FIRST;
            next.next_due_at = Some(now + Stage::FIRST.offset());
        }
    }

    debug!(
        schedule_id = %schedule.id,
        from = schedule.stage.value(),
        to = next.stage.value(),
        completed = next.completed,
        "Review outcome recorded."
    );
    next
}

/// Ordering of the due queue: earliest due first, then less-reinforced first.
pub fn due_order(a: &ReviewSchedule, b: &ReviewSchedule) -> Ordering {
    a.next_due_at
        .cmp(&b.next_due_at)
        .then_with(|| a.stage.cmp(&b.stage))
}

/// All non-completed schedules due at or before `as_of`, in queue order.
pub fn due_query(schedules: &[ReviewSchedule], as_of: DateTime<Utc>) -> Vec<ReviewSchedule> {
    let mut due: Vec<ReviewSchedule> = schedules
        .iter()
        .filter(|s| !s.completed && s.next_due_at.is_some_and(|due| due <= as_of))
        .cloned()
        .collect();
    due.sort_by(due_order);
    due
}

//=========================================================================================
// Presentation Rules
//=========================================================================================

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Whole days from `now` until `due`, rounded up.
pub fn days_until(due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (due - now).num_milliseconds();
    let days = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) == 0 {
        days
    } else {
        days + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Overdue,
    Tomorrow,
    InDays(i64),
    ThisWeek,
    Planned,
}

impl Urgency {
    pub fn from_days(days_until_due: i64) -> Self {
        match days_until_due {
            d if d <= 0 => Urgency::Overdue,
            1 => Urgency::Tomorrow,
            2..=3 => Urgency::InDays(days_until_due),
            4..=7 => Urgency::ThisWeek,
            _ => Urgency::Planned,
        }
    }

    pub fn of(due: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::from_days(days_until(due, now))
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::Overdue => f.write_str("overdue"),
            Urgency::Tomorrow => f.write_str("tomorrow"),
            Urgency::InDays(n) => write!(f, "{} days", n),
            Urgency::ThisWeek => f.write_str("this week"),
            Urgency::Planned => f.write_str("planned"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeDate {
    Today,
    Tomorrow,
    Yesterday,
    DaysAgo(i64),
    InDays(i64),
    On(NaiveDate),
}

impl RelativeDate {
    pub fn of(date: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        match days_until(date, now) {
            0 => RelativeDate::Today,
            1 => RelativeDate::Tomorrow,
            -1 => RelativeDate::Yesterday,
            d if d < -1 => RelativeDate::DaysAgo(-d),
            d if d <= 7 => RelativeDate::InDays(d),
            _ => RelativeDate::On(date.date_naive()),
        }
    }
}

impl fmt::Display for RelativeDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelativeDate::Today => f.write_str("today"),
            RelativeDate::Tomorrow => f.write_str("tomorrow"),
            RelativeDate::Yesterday => f.write_str("yesterday"),
            RelativeDate::DaysAgo(n) => write!(f, "{} days ago", n),
            RelativeDate::InDays(n) => write!(f, "{} days", n),
            RelativeDate::On(date) => write!(f, "{}", date.format("%b %-d")),
        }
    }
}
