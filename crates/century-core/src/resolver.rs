use chrono::NaiveDate;

use crate::event::{Event, EventKind, HabitId};
use crate::event_log::{EventLog, ResolutionError};

/// Authoritative completion state of `habit_id` on `log_date`.
///
/// Absence of events is "not completed". A read failure is returned as an error
/// and is never reported as `false`.
pub fn resolve<L>(log: &L, habit_id: &HabitId, log_date: NaiveDate) -> Result<bool, ResolutionError>
where
    L: EventLog + ?Sized,
{
    let events = log.events_between(habit_id, log_date, log_date)?;
    Ok(resolve_day(&events, log_date))
}

/// Folds one day's events: the completion event with the highest id wins.
///
/// Events for other days and lifecycle markers are ignored, so callers may pass
/// a superset of the day's events.
pub fn resolve_day(events: &[Event], log_date: NaiveDate) -> bool {
    latest_completion(events, log_date)
        .map(|event| event.kind == EventKind::CompletionAsserted)
        .unwrap_or(false)
}

/// The authoritative completion event for `log_date`, if any.
pub fn latest_completion(events: &[Event], log_date: NaiveDate) -> Option<&Event> {
    events
        .iter()
        .filter(|event| event.is_completion_on(log_date))
        .max_by_key(|event| event.event_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventId;
    use crate::event_log::{MemoryEventLog, StorageError};

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("date")
    }

    fn event(id: u64, date: Option<&str>, kind: EventKind) -> Event {
        Event {
            event_id: EventId::new(id),
            habit_id: HabitId::new("habit-a"),
            log_date: date.map(day),
            kind,
            inserted_at: None,
        }
    }

    #[test]
    fn no_events_means_not_completed() {
        let log = MemoryEventLog::new();
        let habit = HabitId::new("habit-a");
        assert!(!resolve(&log, &habit, day("2024-06-15")).expect("resolve"));
    }

    #[test]
    fn retraction_with_higher_id_wins() {
        let log = MemoryEventLog::new();
        let habit = HabitId::new("habit-a");
        let d = day("2024-06-15");
        log.append(&habit, Some(d), EventKind::CompletionAsserted)
            .expect("append");
        assert!(resolve(&log, &habit, d).expect("resolve"));
        log.append(&habit, Some(d), EventKind::CompletionRetracted)
            .expect("append");
        assert!(!resolve(&log, &habit, d).expect("resolve"));
        log.append(&habit, Some(d), EventKind::CompletionAsserted)
            .expect("append");
        assert!(resolve(&log, &habit, d).expect("resolve"));
    }

    #[test]
    fn ordering_is_by_id_not_by_position_or_timestamp() {
        let d = day("2024-06-15");
        let mut events = vec![
            event(9, Some("2024-06-15"), EventKind::CompletionRetracted),
            event(4, Some("2024-06-15"), EventKind::CompletionAsserted),
        ];
        events[0].inserted_at = Some("2020-01-01T00:00:00Z".to_string());
        events[1].inserted_at = Some("2030-01-01T00:00:00Z".to_string());
        assert!(!resolve_day(&events, d));
        assert_eq!(
            latest_completion(&events, d).map(|event| event.event_id),
            Some(EventId::new(9))
        );
    }

    #[test]
    fn lifecycle_and_other_days_are_ignored() {
        let d = day("2024-06-15");
        let events = vec![
            event(1, Some("2024-06-15"), EventKind::CompletionAsserted),
            event(2, None, EventKind::HabitDeleted),
            event(3, Some("2024-06-16"), EventKind::CompletionRetracted),
        ];
        assert!(resolve_day(&events, d));
        assert!(!resolve_day(&events, day("2024-06-16")));
    }

    #[test]
    fn repeated_resolution_is_stable() {
        let log = MemoryEventLog::new();
        let habit = HabitId::new("habit-a");
        let d = day("2024-06-15");
        log.append(&habit, Some(d), EventKind::CompletionAsserted)
            .expect("append");
        let first = resolve(&log, &habit, d).expect("resolve");
        for _ in 0..5 {
            assert_eq!(resolve(&log, &habit, d).expect("resolve"), first);
        }
    }

    struct BrokenLog;

    impl EventLog for BrokenLog {
        fn append(
            &self,
            _habit_id: &HabitId,
            _log_date: Option<NaiveDate>,
            _kind: EventKind,
        ) -> Result<EventId, StorageError> {
            Err(StorageError::Unavailable("offline".to_string()))
        }

        fn events_for(&self, _habit_id: &HabitId) -> Result<Vec<Event>, ResolutionError> {
            Err(ResolutionError::Unavailable("offline".to_string()))
        }
    }

    #[test]
    fn read_failure_is_not_reported_as_false() {
        let err = resolve(&BrokenLog, &HabitId::new("habit-a"), day("2024-06-15"))
            .expect_err("must propagate");
        assert!(err.to_string().contains("offline"));
    }
}
