//! Completion series with date labels for charting.
//!
//! This is a display aid: an unsupported period is coerced to the default instead
//! of being rejected.

use std::fmt;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::event::HabitId;
use crate::event_log::EventLog;
use crate::window::{resolve_window, InvalidWindowError, QueryError, WindowSize};

pub const TREND_PERIODS: [u32; 6] = [100, 200, 300, 365, 400, 500];
pub const DEFAULT_TREND_PERIOD: u32 = 100;
pub const DEFAULT_TREND_WIDTH: f64 = 800.0;
pub const DEFAULT_TREND_PADDING: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "u32")]
pub struct TrendPeriod(u32);

impl TrendPeriod {
    /// Any value outside [`TREND_PERIODS`] becomes [`DEFAULT_TREND_PERIOD`].
    pub fn coerce(value: i64) -> Self {
        TREND_PERIODS
            .iter()
            .copied()
            .find(|period| i64::from(*period) == value)
            .map(Self)
            .unwrap_or_default()
    }

    /// Like [`TrendPeriod::coerce`], but for raw text; unparsable input also falls back.
    pub fn parse_lenient(value: &str) -> Self {
        value
            .trim()
            .parse::<i64>()
            .map(Self::coerce)
            .unwrap_or_default()
    }

    pub fn days(self) -> u32 {
        self.0
    }
}

impl Default for TrendPeriod {
    fn default() -> Self {
        Self(DEFAULT_TREND_PERIOD)
    }
}

impl From<i64> for TrendPeriod {
    fn from(value: i64) -> Self {
        Self::coerce(value)
    }
}

impl From<TrendPeriod> for u32 {
    fn from(value: TrendPeriod) -> Self {
        value.0
    }
}

impl fmt::Display for TrendPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Horizontal geometry the label positions are interpolated across.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendLayout {
    pub width: f64,
    pub padding: f64,
}

impl Default for TrendLayout {
    fn default() -> Self {
        Self {
            width: DEFAULT_TREND_WIDTH,
            padding: DEFAULT_TREND_PADDING,
        }
    }
}

impl TrendLayout {
    fn x_for(&self, index: u32, period: u32) -> f64 {
        let usable = self.width - 2.0 * self.padding;
        let span = f64::from(period.saturating_sub(1).max(1));
        self.padding + usable * f64::from(index) / span
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendLabel {
    pub date: NaiveDate,
    pub label: String,
    pub x: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub habit_id: HabitId,
    pub end_date: NaiveDate,
    pub period: TrendPeriod,
    /// Oldest first: index 0 is `end_date - (period - 1)`, the last entry is `end_date`.
    pub series: Vec<bool>,
    pub labels: Vec<TrendLabel>,
    pub completed: u32,
}

pub fn trend<L>(
    log: &L,
    habit_id: &HabitId,
    end_date: NaiveDate,
    period: TrendPeriod,
    layout: TrendLayout,
) -> Result<Trend, QueryError>
where
    L: EventLog + ?Sized,
{
    let window = WindowSize::new(i64::from(period.days()))?;
    let mut series = resolve_window(log, habit_id, end_date, window)?;
    series.reverse();
    let completed = series.iter().filter(|completed| **completed).count() as u32;
    let labels = sample_labels(end_date, period, layout)?;

    Ok(Trend {
        habit_id: habit_id.clone(),
        end_date,
        period,
        series,
        labels,
        completed,
    })
}

/// Days before `end_date` of the four label samples, oldest first.
///
/// The first three are spaced `(period - 1) / 3` apart starting at the oldest day;
/// the last is always `end_date`.
pub fn sample_offsets(period: TrendPeriod) -> [u32; 4] {
    let last = period.days() - 1;
    let step = last / 3;
    [last, last - step, last - 2 * step, 0]
}

pub fn sample_labels(
    end_date: NaiveDate,
    period: TrendPeriod,
    layout: TrendLayout,
) -> Result<Vec<TrendLabel>, InvalidWindowError> {
    let last = period.days() - 1;
    let mut samples = Vec::with_capacity(4);
    for offset in sample_offsets(period) {
        let date = end_date
            .checked_sub_days(Days::new(u64::from(offset)))
            .ok_or(InvalidWindowError::OutOfRange {
                size: period.days(),
                end: end_date,
            })?;
        samples.push((date, layout.x_for(last - offset, period.days())));
    }

    let with_year = samples.iter().any(|(date, _)| date.year() != end_date.year());
    let format = if with_year { "%b %-d, %Y" } else { "%b %-d" };

    Ok(samples
        .into_iter()
        .map(|(date, x)| TrendLabel {
            date,
            label: date.format(format).to_string(),
            x,
        })
        .collect())
}
