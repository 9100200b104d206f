use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::event::{Event, EventId};
use crate::event_log::ResolutionError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogValidationReport {
    pub ok: bool,
    pub events_path: String,
    pub event_count: usize,
    pub last_event_id: Option<EventId>,
    pub malformed_events: Vec<String>,
    pub order_violations: Vec<String>,
    pub undated_completions: Vec<String>,
    pub dated_lifecycle_events: Vec<String>,
}

/// Checks the log's structural invariants without stopping at the first problem.
pub fn validate_log(events_path: &Path) -> Result<LogValidationReport, ResolutionError> {
    let mut events = Vec::new();
    let mut malformed_events = Vec::new();

    if events_path.exists() {
        let reader = BufReader::new(fs::File::open(events_path)?);
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(trimmed) {
                Ok(event) => events.push(event),
                Err(err) => malformed_events.push(format!("line {}: {}", idx + 1, err)),
            }
        }
    }

    let mut order_violations = Vec::new();
    let mut previous: Option<EventId> = None;
    for event in &events {
        if let Some(prev) = previous {
            if event.event_id <= prev {
                order_violations.push(format!(
                    "event {} follows event {}",
                    event.event_id, prev
                ));
            }
        }
        previous = Some(previous.map_or(event.event_id, |prev| prev.max(event.event_id)));
    }

    let undated_completions = events
        .iter()
        .filter(|event| event.kind.is_completion() && event.log_date.is_none())
        .map(|event| format!("event {} ({})", event.event_id, event.kind))
        .collect::<Vec<_>>();
    let dated_lifecycle_events = events
        .iter()
        .filter(|event| !event.kind.is_completion() && event.log_date.is_some())
        .map(|event| format!("event {} ({})", event.event_id, event.kind))
        .collect::<Vec<_>>();

    Ok(LogValidationReport {
        ok: malformed_events.is_empty()
            && order_violations.is_empty()
            && undated_completions.is_empty()
            && dated_lifecycle_events.is_empty(),
        events_path: events_path.to_string_lossy().to_string(),
        event_count: events.len(),
        last_event_id: previous,
        malformed_events,
        order_violations,
        undated_completions,
        dated_lifecycle_events,
    })
}
