//! Append-only habit event log.
//!
//! The log is the only source of truth for completion state. Nothing here ever
//! rewrites or removes an event; every query re-derives state from the raw lines.

use std::fs;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, NaiveDate};
use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

use crate::event::{Event, EventId, EventKind, HabitId};

pub const EVENTS_FILE: &str = "events.jsonl";

/// Failure to durably record an event.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Event log IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Event log is corrupt at line {line}: {message}")]
    Corrupt { line: usize, message: String },
    #[error("Event log unavailable: {0}")]
    Unavailable(String),
}

/// Failure to read the log. Never used to signal an empty result.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Event log read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed event on line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("Event log unavailable: {0}")]
    Unavailable(String),
}

/// Seam between the aggregation core and whatever stores the events.
///
/// Implementations must hand out event ids from a single counter per log so that
/// ids are unique and strictly increasing, and must return events in id order.
pub trait EventLog {
    /// Durably records one event and returns the id it was assigned.
    fn append(
        &self,
        habit_id: &HabitId,
        log_date: Option<NaiveDate>,
        kind: EventKind,
    ) -> Result<EventId, StorageError>;

    /// All events of a habit, lifecycle markers included, in log order.
    fn events_for(&self, habit_id: &HabitId) -> Result<Vec<Event>, ResolutionError>;

    /// Dated events of a habit with `start <= log_date <= end`, in log order.
    fn events_between(
        &self,
        habit_id: &HabitId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Event>, ResolutionError> {
        Ok(self
            .events_for(habit_id)?
            .into_iter()
            .filter(|event| {
                event
                    .log_date
                    .map(|date| date >= start && date <= end)
                    .unwrap_or(false)
            })
            .collect())
    }
}

/// File-backed log: one JSON event per line in `events.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonlEventLog {
    path: PathBuf,
}

impl JsonlEventLog {
    /// Opens (creating the directory if needed) the log under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: events_path(data_dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every event in the log, in log order.
    pub fn read_all(&self) -> Result<Vec<Event>, ResolutionError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        FileExt::lock_shared(&file)?;
        let parsed = parse_lines(BufReader::new(&file));
        FileExt::unlock(&file)?;
        parsed
    }

    fn append_locked(
        &self,
        file: &mut fs::File,
        habit_id: &HabitId,
        log_date: Option<NaiveDate>,
        kind: EventKind,
    ) -> Result<EventId, StorageError> {
        file.seek(SeekFrom::Start(0))?;
        let existing = parse_lines(BufReader::new(&*file)).map_err(|err| match err {
            ResolutionError::Io(err) => StorageError::Io(err),
            ResolutionError::Malformed { line, message } => {
                StorageError::Corrupt { line, message }
            }
            ResolutionError::Unavailable(message) => StorageError::Unavailable(message),
        })?;
        let event_id = existing
            .iter()
            .map(|event| event.event_id)
            .max()
            .map(EventId::next)
            .unwrap_or(EventId::new(1));

        let event = Event {
            event_id,
            habit_id: habit_id.clone(),
            log_date,
            kind,
            inserted_at: Some(now_rfc3339()),
        };
        let line = serde_json::to_string(&event)?;
        if !ends_with_newline(file)? {
            writeln!(file)?;
        }
        writeln!(file, "{}", line)?;
        file.flush()?;
        file.sync_all()?;
        Ok(event_id)
    }
}

impl EventLog for JsonlEventLog {
    fn append(
        &self,
        habit_id: &HabitId,
        log_date: Option<NaiveDate>,
        kind: EventKind,
    ) -> Result<EventId, StorageError> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        FileExt::lock_exclusive(&file)?;
        let appended = self.append_locked(&mut file, habit_id, log_date, kind);
        FileExt::unlock(&file)?;
        let event_id = appended?;
        debug!(%habit_id, %event_id, %kind, ?log_date, "appended event");
        Ok(event_id)
    }

    fn events_for(&self, habit_id: &HabitId) -> Result<Vec<Event>, ResolutionError> {
        let events = self.read_all()?;
        let matching: Vec<Event> = events
            .into_iter()
            .filter(|event| &event.habit_id == habit_id)
            .collect();
        debug!(%habit_id, events = matching.len(), "read habit events");
        Ok(matching)
    }
}

/// In-process log with the same ordering contract as [`JsonlEventLog`].
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<Event>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventLog for MemoryEventLog {
    fn append(
        &self,
        habit_id: &HabitId,
        log_date: Option<NaiveDate>,
        kind: EventKind,
    ) -> Result<EventId, StorageError> {
        let mut events = self
            .events
            .lock()
            .map_err(|err| StorageError::Unavailable(err.to_string()))?;
        let event_id = events
            .last()
            .map(|event| event.event_id.next())
            .unwrap_or(EventId::new(1));
        events.push(Event {
            event_id,
            habit_id: habit_id.clone(),
            log_date,
            kind,
            inserted_at: Some(now_rfc3339()),
        });
        Ok(event_id)
    }

    fn events_for(&self, habit_id: &HabitId) -> Result<Vec<Event>, ResolutionError> {
        let events = self
            .events
            .lock()
            .map_err(|err| ResolutionError::Unavailable(err.to_string()))?;
        Ok(events
            .iter()
            .filter(|event| &event.habit_id == habit_id)
            .cloned()
            .collect())
    }
}

pub fn events_path(data_dir: &Path) -> PathBuf {
    data_dir.join(EVENTS_FILE)
}

pub(crate) fn now_rfc3339() -> String {
    Local::now().to_rfc3339()
}

/// True for an empty file, so the first event starts at byte zero.
fn ends_with_newline(file: &mut fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn parse_lines<R: BufRead>(reader: R) -> Result<Vec<Event>, ResolutionError> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event = serde_json::from_str::<Event>(trimmed).map_err(|err| {
            ResolutionError::Malformed {
                line: idx + 1,
                message: err.to_string(),
            }
        })?;
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let temp = TempDir::new().expect("tempdir");
        let log = JsonlEventLog::open(temp.path()).expect("open");
        assert!(log.read_all().expect("read").is_empty());
        assert!(log
            .events_for(&HabitId::new("habit-a"))
            .expect("read")
            .is_empty());
    }

    #[test]
    fn ids_come_from_one_counter_across_habits() {
        let temp = TempDir::new().expect("tempdir");
        let log = JsonlEventLog::open(temp.path()).expect("open");
        let a = HabitId::new("habit-a");
        let b = HabitId::new("habit-b");

        let first = log.append(&a, None, EventKind::HabitCreated).expect("append");
        let second = log
            .append(&b, Some(day("2024-03-01")), EventKind::CompletionAsserted)
            .expect("append");
        let third = log
            .append(&a, Some(day("2024-03-01")), EventKind::CompletionAsserted)
            .expect("append");

        assert_eq!(first, EventId::new(1));
        assert_eq!(second, EventId::new(2));
        assert_eq!(third, EventId::new(3));

        let reopened = JsonlEventLog::open(temp.path()).expect("reopen");
        let next = reopened
            .append(&b, Some(day("2024-03-01")), EventKind::CompletionRetracted)
            .expect("append");
        assert_eq!(next, EventId::new(4));
        assert_eq!(reopened.events_for(&a).expect("read").len(), 2);
    }

    #[test]
    fn duplicate_day_events_are_kept() {
        let temp = TempDir::new().expect("tempdir");
        let log = JsonlEventLog::open(temp.path()).expect("open");
        let habit = HabitId::new("habit-a");
        for _ in 0..3 {
            log.append(&habit, Some(day("2024-03-01")), EventKind::CompletionAsserted)
                .expect("append");
        }
        assert_eq!(log.events_for(&habit).expect("read").len(), 3);
    }

    #[test]
    fn events_between_skips_lifecycle_and_out_of_range() {
        let log = MemoryEventLog::new();
        let habit = HabitId::new("habit-a");
        log.append(&habit, None, EventKind::HabitCreated).expect("append");
        log.append(&habit, Some(day("2024-02-28")), EventKind::CompletionAsserted)
            .expect("append");
        log.append(&habit, Some(day("2024-03-01")), EventKind::CompletionAsserted)
            .expect("append");
        log.append(&habit, Some(day("2024-03-05")), EventKind::CompletionAsserted)
            .expect("append");

        let events = log
            .events_between(&habit, day("2024-02-29"), day("2024-03-05"))
            .expect("read");
        let dates: Vec<_> = events.iter().filter_map(|event| event.log_date).collect();
        assert_eq!(dates, vec![day("2024-03-01"), day("2024-03-05")]);
    }

    #[test]
    fn malformed_line_is_a_read_error_not_absence() {
        let temp = TempDir::new().expect("tempdir");
        let log = JsonlEventLog::open(temp.path()).expect("open");
        let habit = HabitId::new("habit-a");
        log.append(&habit, Some(day("2024-03-01")), EventKind::CompletionAsserted)
            .expect("append");
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .expect("open raw");
        writeln!(file, "{{not json").expect("tamper");

        let err = log.events_for(&habit).expect_err("must fail");
        assert!(matches!(err, ResolutionError::Malformed { line: 2, .. }));

        let err = log
            .append(&habit, Some(day("2024-03-02")), EventKind::CompletionAsserted)
            .expect_err("append must refuse a corrupt log");
        assert!(matches!(err, StorageError::Corrupt { line: 2, .. }));
    }

    #[test]
    fn append_after_unterminated_last_line_keeps_both_events() {
        let temp = TempDir::new().expect("tempdir");
        let log = JsonlEventLog::open(temp.path()).expect("open");
        let habit = HabitId::new("habit-a");
        let d = day("2024-03-01");
        fs::write(
            log.path(),
            r#"{"event_id":1,"habit_id":"habit-a","log_date":"2024-03-01","kind":"mark_complete"}"#,
        )
        .expect("seed");
        assert!(crate::resolver::resolve(&log, &habit, d).expect("resolve"));

        let next = log
            .append(&habit, Some(d), EventKind::CompletionRetracted)
            .expect("append");
        assert_eq!(next, EventId::new(2));

        let events = log.read_all().expect("read");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, EventKind::CompletionRetracted);
        assert!(!crate::resolver::resolve(&log, &habit, d).expect("resolve"));
        let text = fs::read_to_string(log.path()).expect("raw");
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn poisoned_memory_log_still_reports_its_length() {
        let log = std::sync::Arc::new(MemoryEventLog::new());
        log.append(&HabitId::new("habit-a"), None, EventKind::HabitCreated)
            .expect("append");
        let poisoner = std::sync::Arc::clone(&log);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.events.lock().expect("lock");
            panic!("poison the log");
        })
        .join();
        assert!(log.events.is_poisoned());
        assert_eq!(log.len(), 1);
        assert!(!log.is_empty());
    }

    #[test]
    fn memory_log_matches_file_ordering() {
        let log = MemoryEventLog::new();
        let habit = HabitId::new("habit-a");
        assert!(log.is_empty());
        let first = log.append(&habit, None, EventKind::HabitCreated).expect("append");
        let second = log
            .append(&HabitId::new("habit-b"), None, EventKind::HabitCreated)
            .expect("append");
        assert!(second > first);
        assert_eq!(log.len(), 2);
        assert_eq!(log.events_for(&habit).expect("read").len(), 1);
    }
}
