use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque, stable habit identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(String);

impl HabitId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(format!("habit-{}", Ulid::new().to_string().to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HabitId {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

/// Position of an event in the log. Assigned at insertion, unique and strictly
/// increasing across the whole log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(u64);

impl EventId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[serde(alias = "mark_complete")]
    CompletionAsserted,
    #[serde(alias = "mark_incomplete")]
    CompletionRetracted,
    HabitCreated,
    HabitDeleted,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::CompletionAsserted => "completion_asserted",
            EventKind::CompletionRetracted => "completion_retracted",
            EventKind::HabitCreated => "habit_created",
            EventKind::HabitDeleted => "habit_deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "completion_asserted" | "mark_complete" => Some(Self::CompletionAsserted),
            "completion_retracted" | "mark_incomplete" => Some(Self::CompletionRetracted),
            "habit_created" => Some(Self::HabitCreated),
            "habit_deleted" => Some(Self::HabitDeleted),
            _ => None,
        }
    }

    /// Completion kinds take part in per-day state resolution; lifecycle kinds never do.
    pub fn is_completion(self) -> bool {
        matches!(
            self,
            EventKind::CompletionAsserted | EventKind::CompletionRetracted
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable fact in the habit log.
///
/// `inserted_at` is informational; `event_id` is the ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub habit_id: HabitId,
    #[serde(default)]
    pub log_date: Option<NaiveDate>,
    pub kind: EventKind,
    #[serde(default)]
    pub inserted_at: Option<String>,
}

impl Event {
    pub fn is_completion_on(&self, date: NaiveDate) -> bool {
        self.kind.is_completion() && self.log_date == Some(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_kind_names_are_accepted_on_read() {
        let line = r#"{"event_id":3,"habit_id":"habit-a","log_date":"2024-01-02","kind":"mark_complete"}"#;
        let event: Event = serde_json::from_str(line).expect("parse");
        assert_eq!(event.kind, EventKind::CompletionAsserted);
        assert_eq!(event.event_id, EventId::new(3));
        assert!(event.inserted_at.is_none());

        let line = r#"{"event_id":4,"habit_id":"habit-a","log_date":"2024-01-02","kind":"mark_incomplete"}"#;
        let event: Event = serde_json::from_str(line).expect("parse");
        assert_eq!(event.kind, EventKind::CompletionRetracted);
    }

    #[test]
    fn lifecycle_events_serialize_null_date() {
        let event = Event {
            event_id: EventId::new(1),
            habit_id: HabitId::new("habit-a"),
            log_date: None,
            kind: EventKind::HabitCreated,
            inserted_at: None,
        };
        let line = serde_json::to_string(&event).expect("serialize");
        assert!(line.contains(r#""log_date":null"#));
        assert!(line.contains(r#""kind":"habit_created""#));
    }

    #[test]
    fn only_completion_kinds_resolve() {
        assert!(EventKind::CompletionAsserted.is_completion());
        assert!(EventKind::CompletionRetracted.is_completion());
        assert!(!EventKind::HabitCreated.is_completion());
        assert!(!EventKind::HabitDeleted.is_completion());
        assert_eq!(EventKind::parse(" Mark_Complete "), Some(EventKind::CompletionAsserted));
        assert_eq!(EventKind::parse("nope"), None);
    }

    #[test]
    fn generated_habit_ids_are_prefixed() {
        let id = HabitId::generate();
        assert!(id.as_str().starts_with("habit-"));
        assert_ne!(id, HabitId::generate());
    }
}
