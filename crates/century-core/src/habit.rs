//! Habit records and the write path that produces events.
//!
//! Records live in `habits.json` and are rewritten atomically; completion state is
//! never stored here, only in the event log.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::event::{Event, EventId, EventKind, HabitId};
use crate::event_log::{now_rfc3339, EventLog, JsonlEventLog, ResolutionError, StorageError};
use crate::resolver::resolve;
use crate::window::{window_count, QueryError, WindowSize};

pub const HABITS_FILE: &str = "habits.json";
const HABITS_LOCK_FILE: &str = "habits.lock";
const HABITS_FILE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum HabitError {
    #[error("Habit store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Habit store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("unknown habit: {0}")]
    UnknownHabit(String),
    #[error("habit {habit_id} is not owned by {owner}")]
    NotOwner { habit_id: String, owner: String },
    #[error("Invalid habit operation: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    pub name: String,
    pub created_at: String,
    #[serde(default)]
    pub display_order: Option<u32>,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitSummary {
    pub id: HabitId,
    pub name: String,
    pub display_order: Option<u32>,
    pub count: u32,
    pub window: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub habit_id: HabitId,
    pub log_date: NaiveDate,
    pub completed: bool,
    pub event_id: EventId,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HabitsFile {
    version: u32,
    #[serde(default)]
    habits: Vec<Habit>,
}

#[derive(Debug)]
pub struct HabitStore<L = JsonlEventLog> {
    data_dir: PathBuf,
    log: L,
}

impl HabitStore<JsonlEventLog> {
    /// Opens the file-backed store rooted at `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, HabitError> {
        let log = JsonlEventLog::open(data_dir)?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            log,
        })
    }
}

impl<L: EventLog> HabitStore<L> {
    /// Store whose records live under `data_dir` but whose events go to `log`.
    pub fn with_log(data_dir: &Path, log: L) -> Result<Self, HabitError> {
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            log,
        })
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn create_habit(
        &self,
        owner: &str,
        name: &str,
        display_order: Option<u32>,
    ) -> Result<Habit, HabitError> {
        let owner = normalized_non_empty("owner", owner)?;
        let name = normalized_non_empty("name", name)?;

        self.with_records_locked(|habits| {
            let display_order = display_order.or_else(|| {
                let next = habits
                    .iter()
                    .filter(|habit| habit.owner == owner)
                    .filter_map(|habit| habit.display_order)
                    .max()
                    .map(|max| max + 1)
                    .unwrap_or(0);
                Some(next)
            });
            let habit = Habit {
                id: HabitId::generate(),
                name: name.clone(),
                created_at: now_rfc3339(),
                display_order,
                owner: owner.clone(),
            };
            self.log.append(&habit.id, None, EventKind::HabitCreated)?;
            habits.push(habit.clone());
            info!(habit_id = %habit.id, %owner, "created habit");
            Ok(habit)
        })
    }

    pub fn list_habits(&self, owner: &str) -> Result<Vec<Habit>, HabitError> {
        let mut habits: Vec<Habit> = read_records(&self.data_dir)?
            .into_iter()
            .filter(|habit| habit.owner == owner)
            .collect();
        sort_for_display(&mut habits);
        Ok(habits)
    }

    pub fn get_habit(&self, owner: &str, habit_id: &HabitId) -> Result<Habit, HabitError> {
        let habits = read_records(&self.data_dir)?;
        let habit = find_owned(&habits, owner, habit_id)?;
        Ok(habit.clone())
    }

    pub fn rename_habit(
        &self,
        owner: &str,
        habit_id: &HabitId,
        name: &str,
    ) -> Result<Habit, HabitError> {
        let name = normalized_non_empty("name", name)?;
        self.with_records_locked(|habits| {
            find_owned(habits, owner, habit_id)?;
            let habit = habits
                .iter_mut()
                .find(|habit| &habit.id == habit_id)
                .ok_or_else(|| HabitError::UnknownHabit(habit_id.to_string()))?;
            habit.name = name.clone();
            info!(%habit_id, "renamed habit");
            Ok(habit.clone())
        })
    }

    /// Assigns display positions `0..n` in the given order. `ordered` must list
    /// every habit of `owner` exactly once.
    pub fn reorder_habits(
        &self,
        owner: &str,
        ordered: &[HabitId],
    ) -> Result<Vec<Habit>, HabitError> {
        self.with_records_locked(|habits| {
            let owned: HashSet<&HabitId> = habits
                .iter()
                .filter(|habit| habit.owner == owner)
                .map(|habit| &habit.id)
                .collect();
            let requested: HashSet<&HabitId> = ordered.iter().collect();
            if requested.len() != ordered.len() {
                return Err(HabitError::Invalid(
                    "reorder lists a habit more than once".to_string(),
                ));
            }
            if requested != owned {
                return Err(HabitError::Invalid(format!(
                    "reorder must list exactly the {} habits owned by {}",
                    owned.len(),
                    owner
                )));
            }
            for habit in habits.iter_mut() {
                if let Some(position) = ordered.iter().position(|id| id == &habit.id) {
                    habit.display_order = Some(position as u32);
                }
            }
            info!(%owner, habits = ordered.len(), "reordered habits");
            let mut result: Vec<Habit> = habits
                .iter()
                .filter(|habit| habit.owner == owner)
                .cloned()
                .collect();
            sort_for_display(&mut result);
            Ok(result)
        })
    }

    /// Retires a habit. The deletion marker is logged before the record goes away
    /// and the habit's events stay in the log.
    pub fn delete_habit(&self, owner: &str, habit_id: &HabitId) -> Result<Habit, HabitError> {
        self.with_records_locked(|habits| {
            let habit = find_owned(habits, owner, habit_id)?.clone();
            self.log.append(habit_id, None, EventKind::HabitDeleted)?;
            habits.retain(|candidate| &candidate.id != habit_id);
            info!(%habit_id, "deleted habit");
            Ok(habit)
        })
    }

    pub fn mark_complete(
        &self,
        owner: &str,
        habit_id: &HabitId,
        log_date: NaiveDate,
    ) -> Result<ToggleOutcome, HabitError> {
        self.record_completion(owner, habit_id, log_date, true)
    }

    pub fn mark_incomplete(
        &self,
        owner: &str,
        habit_id: &HabitId,
        log_date: NaiveDate,
    ) -> Result<ToggleOutcome, HabitError> {
        self.record_completion(owner, habit_id, log_date, false)
    }

    /// Flips the day's resolved state by appending the opposite event.
    pub fn toggle(
        &self,
        owner: &str,
        habit_id: &HabitId,
        log_date: NaiveDate,
    ) -> Result<ToggleOutcome, HabitError> {
        self.get_habit(owner, habit_id)?;
        let current = resolve(&self.log, habit_id, log_date)?;
        self.record_completion(owner, habit_id, log_date, !current)
    }

    pub fn status(
        &self,
        owner: &str,
        habit_id: &HabitId,
        log_date: NaiveDate,
    ) -> Result<bool, HabitError> {
        self.get_habit(owner, habit_id)?;
        Ok(resolve(&self.log, habit_id, log_date)?)
    }

    /// Raw events of a habit in log order. A live habit must belong to `owner`;
    /// a retired id (record gone, events kept) is served from the log alone.
    pub fn habit_events(&self, owner: &str, habit_id: &HabitId) -> Result<Vec<Event>, HabitError> {
        let habits = read_records(&self.data_dir)?;
        let live = habits.iter().any(|habit| &habit.id == habit_id);
        if live {
            find_owned(&habits, owner, habit_id)?;
        }
        let events = self.log.events_for(habit_id)?;
        if !live && events.is_empty() {
            return Err(HabitError::UnknownHabit(habit_id.to_string()));
        }
        Ok(events)
    }

    /// Window counts for every habit of `owner`, in display order.
    pub fn habit_stats(
        &self,
        owner: &str,
        end_date: NaiveDate,
        window: WindowSize,
    ) -> Result<Vec<HabitSummary>, HabitError> {
        let habits = self.list_habits(owner)?;
        let mut stats = Vec::with_capacity(habits.len());
        for habit in habits {
            let count = window_count(&self.log, &habit.id, end_date, window)?;
            stats.push(HabitSummary {
                id: habit.id,
                name: habit.name,
                display_order: habit.display_order,
                count,
                window: window.get(),
            });
        }
        Ok(stats)
    }

    fn record_completion(
        &self,
        owner: &str,
        habit_id: &HabitId,
        log_date: NaiveDate,
        completed: bool,
    ) -> Result<ToggleOutcome, HabitError> {
        self.get_habit(owner, habit_id)?;
        let kind = if completed {
            EventKind::CompletionAsserted
        } else {
            EventKind::CompletionRetracted
        };
        let event_id = self.log.append(habit_id, Some(log_date), kind)?;
        info!(%habit_id, %log_date, completed, "recorded completion");
        Ok(ToggleOutcome {
            habit_id: habit_id.clone(),
            log_date,
            completed,
            event_id,
        })
    }

    fn with_records_locked<T>(
        &self,
        apply: impl FnOnce(&mut Vec<Habit>) -> Result<T, HabitError>,
    ) -> Result<T, HabitError> {
        fs::create_dir_all(&self.data_dir)?;
        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.data_dir.join(HABITS_LOCK_FILE))?;
        FileExt::lock_exclusive(&lock)?;
        let result = read_records(&self.data_dir).and_then(|mut habits| {
            let value = apply(&mut habits)?;
            write_records(&self.data_dir, &habits)?;
            Ok(value)
        });
        FileExt::unlock(&lock)?;
        result
    }
}

pub fn habits_path(data_dir: &Path) -> PathBuf {
    data_dir.join(HABITS_FILE)
}

fn read_records(data_dir: &Path) -> Result<Vec<Habit>, HabitError> {
    let path = habits_path(data_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(&path)?;
    let file: HabitsFile = serde_json::from_str(&text)?;
    Ok(file.habits)
}

fn write_records(data_dir: &Path, habits: &[Habit]) -> Result<(), HabitError> {
    let path = habits_path(data_dir);
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_string_pretty(&HabitsFile {
        version: HABITS_FILE_VERSION,
        habits: habits.to_vec(),
    })?;
    let mut file = fs::File::create(&tmp)?;
    file.write_all(body.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

fn find_owned<'a>(
    habits: &'a [Habit],
    owner: &str,
    habit_id: &HabitId,
) -> Result<&'a Habit, HabitError> {
    let habit = habits
        .iter()
        .find(|habit| &habit.id == habit_id)
        .ok_or_else(|| HabitError::UnknownHabit(habit_id.to_string()))?;
    if habit.owner != owner {
        return Err(HabitError::NotOwner {
            habit_id: habit_id.to_string(),
            owner: owner.to_string(),
        });
    }
    Ok(habit)
}

fn sort_for_display(habits: &mut [Habit]) {
    habits.sort_by(|a, b| {
        let a_order = a.display_order.unwrap_or(u32::MAX);
        let b_order = b.display_order.unwrap_or(u32::MAX);
        a_order
            .cmp(&b_order)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn normalized_non_empty(field: &str, value: &str) -> Result<String, HabitError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HabitError::Invalid(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}
