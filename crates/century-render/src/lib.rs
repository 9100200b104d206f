//! Plain-text and CSV views of habit aggregates.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use thiserror::Error;

use century_core::habit::{Habit, HabitSummary};
use century_core::Trend;

const DONE: char = '#';
const MISSED: char = '.';
const DENSITY: [char; 5] = [' ', '.', ':', '+', '#'];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV buffer error: {0}")]
    Buffer(String),
    #[error("a {len}-day history ending {end} starts before the earliest representable date")]
    OutOfRange { len: usize, end: NaiveDate },
}

#[derive(Debug, Serialize)]
struct DayRow {
    date: NaiveDate,
    completed: bool,
}

/// Grid of `columns` cells per row, newest day first, `#` for completed days.
pub fn render_history_grid(history: &[bool], columns: usize) -> String {
    let columns = columns.max(1);
    history
        .chunks(columns)
        .map(|row| {
            row.iter()
                .map(|completed| if *completed { DONE } else { MISSED })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One `date,completed` row per day of a newest-first history ending at `end_date`.
pub fn render_history_csv(end_date: NaiveDate, history: &[bool]) -> Result<String, RenderError> {
    let mut rows = Vec::with_capacity(history.len());
    for (offset, completed) in history.iter().enumerate() {
        let date = end_date
            .checked_sub_days(Days::new(offset as u64))
            .ok_or(RenderError::OutOfRange {
                len: history.len(),
                end: end_date,
            })?;
        rows.push(DayRow {
            date,
            completed: *completed,
        });
    }
    write_csv(&rows)
}

/// Oldest-first `date,completed` rows for a trend series.
pub fn render_trend_csv(trend: &Trend) -> Result<String, RenderError> {
    let last = trend.series.len().saturating_sub(1);
    let mut rows = Vec::with_capacity(trend.series.len());
    for (index, completed) in trend.series.iter().enumerate() {
        let date = trend
            .end_date
            .checked_sub_days(Days::new((last - index) as u64))
            .ok_or(RenderError::OutOfRange {
                len: trend.series.len(),
                end: trend.end_date,
            })?;
        rows.push(DayRow {
            date,
            completed: *completed,
        });
    }
    write_csv(&rows)
}

/// Density strip of the series squeezed into `width` columns, with the sample
/// labels placed underneath at their interpolated positions.
pub fn render_trend_text(trend: &Trend, width: usize) -> String {
    let width = width.max(1).min(trend.series.len().max(1));
    let mut strip = String::with_capacity(width);
    for column in 0..width {
        let from = column * trend.series.len() / width;
        let to = ((column + 1) * trend.series.len() / width).max(from + 1);
        let bucket = &trend.series[from..to.min(trend.series.len())];
        let done = bucket.iter().filter(|completed| **completed).count();
        let level = if bucket.is_empty() {
            0
        } else {
            (done * (DENSITY.len() - 1) + bucket.len() - 1) / bucket.len()
        };
        strip.push(DENSITY[level]);
    }

    let mut axis = vec![' '; width];
    let mut legend = Vec::new();
    let first_x = trend.labels.first().map(|label| label.x).unwrap_or(0.0);
    let last_x = trend.labels.last().map(|label| label.x).unwrap_or(0.0);
    let span = (last_x - first_x).max(f64::EPSILON);
    for label in &trend.labels {
        let column = (((label.x - first_x) / span) * (width - 1) as f64).round() as usize;
        axis[column.min(width - 1)] = '|';
        legend.push(label.label.clone());
    }

    format!(
        "{}\n{}\n{}\n{}/{} days completed",
        strip,
        axis.into_iter().collect::<String>(),
        legend.join("  "),
        trend.completed,
        trend.series.len()
    )
}

pub fn render_stats_table(stats: &[HabitSummary]) -> String {
    if stats.is_empty() {
        return "No habits yet.".to_string();
    }
    let name_width = stats
        .iter()
        .map(|summary| summary.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("HABIT".len());
    let mut lines = vec![format!(
        "{:<name_width$}  {:>7}  ID",
        "HABIT", "COUNT"
    )];
    for summary in stats {
        lines.push(format!(
            "{:<name_width$}  {:>7}  {}",
            summary.name,
            format!("{}/{}", summary.count, summary.window),
            summary.id
        ));
    }
    lines.join("\n")
}

pub fn render_habit_list(habits: &[Habit]) -> String {
    if habits.is_empty() {
        return "No habits yet.".to_string();
    }
    habits
        .iter()
        .map(|habit| {
            let order = habit
                .display_order
                .map(|value| value.to_string())
                .unwrap_or_else(|| "-".to_string());
            format!("{:>3}  {}  {}", order, habit.id, habit.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn write_csv<T: Serialize>(rows: &[T]) -> Result<String, RenderError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| RenderError::Buffer(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| RenderError::Buffer(err.to_string()))
}
