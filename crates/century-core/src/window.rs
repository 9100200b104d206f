//! Rolling-window aggregation over the event log.
//!
//! Both the count and the per-day history come out of [`resolve_window`], so a
//! window's count always equals the number of `true` days in its history.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::event::{Event, HabitId};
use crate::event_log::{EventLog, ResolutionError};
use crate::resolver::resolve_day;

pub const DEFAULT_WINDOW_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidWindowError {
    #[error("window size must be positive (got {0})")]
    NonPositive(i64),
    #[error("window size must be an integer (got {0:?})")]
    NotAnInteger(String),
    #[error("window size {0} is too large")]
    TooLarge(i64),
    #[error("a {size}-day window ending {end} starts before the earliest representable date")]
    OutOfRange { size: u32, end: NaiveDate },
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    InvalidWindow(#[from] InvalidWindowError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// Number of consecutive calendar days in a window. Always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct WindowSize(u32);

impl WindowSize {
    pub fn new(value: i64) -> Result<Self, InvalidWindowError> {
        if value <= 0 {
            return Err(InvalidWindowError::NonPositive(value));
        }
        let value = u32::try_from(value).map_err(|_| InvalidWindowError::TooLarge(value))?;
        Ok(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// First day of the window that ends at (and includes) `end_date`.
    pub fn start(self, end_date: NaiveDate) -> Result<NaiveDate, InvalidWindowError> {
        end_date
            .checked_sub_days(Days::new(u64::from(self.0 - 1)))
            .ok_or(InvalidWindowError::OutOfRange {
                size: self.0,
                end: end_date,
            })
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self(DEFAULT_WINDOW_SIZE)
    }
}

impl TryFrom<i64> for WindowSize {
    type Error = InvalidWindowError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WindowSize> for u32 {
    fn from(value: WindowSize) -> Self {
        value.0
    }
}

impl FromStr for WindowSize {
    type Err = InvalidWindowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let parsed = trimmed
            .parse::<i64>()
            .map_err(|_| InvalidWindowError::NotAnInteger(trimmed.to_string()))?;
        Self::new(parsed)
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion count over the `window` days ending at `end_date`. In `0..=window`.
pub fn window_count<L>(
    log: &L,
    habit_id: &HabitId,
    end_date: NaiveDate,
    window: WindowSize,
) -> Result<u32, QueryError>
where
    L: EventLog + ?Sized,
{
    let days = resolve_window(log, habit_id, end_date, window)?;
    let count = days.iter().filter(|completed| **completed).count() as u32;
    debug!(%habit_id, %end_date, %window, count, "window count");
    Ok(count)
}

/// Per-day completion for the window, newest first: index `k` is `end_date - k`.
pub fn history<L>(
    log: &L,
    habit_id: &HabitId,
    end_date: NaiveDate,
    window: WindowSize,
) -> Result<Vec<bool>, QueryError>
where
    L: EventLog + ?Sized,
{
    resolve_window(log, habit_id, end_date, window)
}

/// Resolves every day of the window from one read of the log. Newest first.
pub(crate) fn resolve_window<L>(
    log: &L,
    habit_id: &HabitId,
    end_date: NaiveDate,
    window: WindowSize,
) -> Result<Vec<bool>, QueryError>
where
    L: EventLog + ?Sized,
{
    let start = window.start(end_date)?;
    let events = log.events_between(habit_id, start, end_date)?;

    let mut by_day: HashMap<NaiveDate, Vec<Event>> = HashMap::new();
    for event in events {
        if let Some(date) = event.log_date {
            by_day.entry(date).or_default().push(event);
        }
    }

    let mut days: Vec<bool> = start
        .iter_days()
        .take(window.get() as usize)
        .map(|date| {
            by_day
                .get(&date)
                .map(|events| resolve_day(events, date))
                .unwrap_or(false)
        })
        .collect();
    days.reverse();
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::event_log::MemoryEventLog;
    use pretty_assertions::assert_eq;

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn window_size_rejects_non_positive_and_non_integer() {
        assert_eq!(WindowSize::new(0), Err(InvalidWindowError::NonPositive(0)));
        assert_eq!(WindowSize::new(-5), Err(InvalidWindowError::NonPositive(-5)));
        assert_eq!(
            "12.5".parse::<WindowSize>(),
            Err(InvalidWindowError::NotAnInteger("12.5".to_string()))
        );
        assert_eq!(" 30 ".parse::<WindowSize>().map(WindowSize::get), Ok(30));
        assert_eq!(WindowSize::default().get(), 100);
    }

    #[test]
    fn window_start_includes_end_date() {
        let window = WindowSize::new(100).expect("window");
        assert_eq!(window.start(day("2024-06-15")), Ok(day("2024-03-08")));
        let single = WindowSize::new(1).expect("window");
        assert_eq!(single.start(day("2024-06-15")), Ok(day("2024-06-15")));
    }

    #[test]
    fn empty_habit_has_zero_count_and_all_false_history() {
        let log = MemoryEventLog::new();
        let habit = HabitId::new("habit-a");
        let window = WindowSize::new(37).expect("window");
        let end = day("2024-06-15");
        assert_eq!(window_count(&log, &habit, end, window).expect("count"), 0);
        let days = history(&log, &habit, end, window).expect("history");
        assert_eq!(days.len(), 37);
        assert!(days.iter().all(|completed| !completed));
    }

    #[test]
    fn history_is_newest_first_and_bounded() {
        let log = MemoryEventLog::new();
        let habit = HabitId::new("habit-a");
        let end = day("2024-06-15");
        let oldest = day("2024-03-08");
        for date in [end, oldest, day("2024-03-07"), day("2024-06-16")] {
            log.append(&habit, Some(date), EventKind::CompletionAsserted)
                .expect("append");
        }

        let days = history(&log, &habit, end, WindowSize::default()).expect("history");
        assert_eq!(days.len(), 100);
        assert!(days[0]);
        assert!(days[99]);
        assert_eq!(days.iter().filter(|completed| **completed).count(), 2);
        assert_eq!(
            window_count(&log, &habit, end, WindowSize::default()).expect("count"),
            2
        );
    }

    #[test]
    fn count_matches_history_after_toggles() {
        let log = MemoryEventLog::new();
        let habit = HabitId::new("habit-a");
        let other = HabitId::new("habit-b");
        let end = day("2024-01-10");
        let window = WindowSize::new(10).expect("window");

        let plan = [
            ("2024-01-01", EventKind::CompletionAsserted),
            ("2024-01-02", EventKind::CompletionAsserted),
            ("2024-01-02", EventKind::CompletionRetracted),
            ("2024-01-05", EventKind::CompletionRetracted),
            ("2024-01-05", EventKind::CompletionAsserted),
            ("2024-01-10", EventKind::CompletionAsserted),
            ("2023-12-31", EventKind::CompletionAsserted),
        ];
        for (date, kind) in plan {
            log.append(&habit, Some(day(date)), kind).expect("append");
        }
        log.append(&other, Some(day("2024-01-03")), EventKind::CompletionAsserted)
            .expect("append");

        let days = history(&log, &habit, end, window).expect("history");
        let expected = vec![
            true, false, false, false, false, true, false, false, false, true,
        ];
        assert_eq!(days, expected);
        assert_eq!(
            window_count(&log, &habit, end, window).expect("count") as usize,
            days.iter().filter(|completed| **completed).count()
        );
    }
}
