//! Event-sourced habit completion tracking for Century.
//!
//! Completion state is never stored directly: it is re-derived on every query
//! from the append-only event log.

pub mod config;
pub mod doctor;
pub mod event;
pub mod event_log;
pub mod habit;
pub mod resolver;
pub mod trend;
pub mod window;

pub use event::{Event, EventId, EventKind, HabitId};
pub use event_log::{EventLog, JsonlEventLog, MemoryEventLog, ResolutionError, StorageError};
pub use resolver::resolve;
pub use trend::{trend, Trend, TrendLabel, TrendLayout, TrendPeriod};
pub use window::{history, window_count, InvalidWindowError, QueryError, WindowSize};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
