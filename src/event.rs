//! Structured event sink.
//!
//! Every component that wants to report something (a dropped pick, a skipped
//! dust order, a degraded upstream read) goes through one interface:
//! [`EventSink::record`]. Implementations must never panic and never
//! propagate their own failures back into the pipeline.

use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;

/// Severity of a recorded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<Level> for log::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Debug => log::Level::Debug,
            Level::Info => log::Level::Info,
            Level::Warn => log::Level::Warn,
            Level::Error => log::Level::Error,
        }
    }
}

/// Destination for structured events.
pub trait EventSink {
    /// Record one event. Must not panic or fail.
    fn record(&self, level: Level, event: &str, detail: Value);

    fn info(&self, event: &str, detail: Value) {
        self.record(Level::Info, event, detail);
    }

    fn warn(&self, event: &str, detail: Value) {
        self.record(Level::Warn, event, detail);
    }
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn record(&self, level: Level, event: &str, detail: Value) {
        (**self).record(level, event, detail);
    }
}

/// Forwards events to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, level: Level, event: &str, detail: Value) {
        log::log!(target: "alphabook", level.into(), "{event} {detail}");
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _level: Level, _event: &str, _detail: Value) {}
}

/// One event captured by [`RecordingSink`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    pub level: Level,
    pub event: String,
    pub detail: Value,
}

/// Keeps events in memory, for tests and for callers that want to inspect
/// what a component reported.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// True if an event with this name was recorded.
    pub fn contains(&self, event: &str) -> bool {
        self.events
            .lock()
            .map(|e| e.iter().any(|r| r.event == event))
            .unwrap_or(false)
    }
}

impl EventSink for RecordingSink {
    fn record(&self, level: Level, event: &str, detail: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                level,
                event: event.to_string(),
                detail,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recording_sink_captures() {
        let sink = RecordingSink::new();
        sink.info("cycle_started", json!({"trigger": "manual"}));
        sink.warn("intraday_price_fetch_failed", json!({}));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].level, Level::Info);
        assert_eq!(events[1].level, Level::Warn);
        assert!(sink.contains("cycle_started"));
        assert!(!sink.contains("nope"));
    }

    #[test]
    fn sink_by_reference() {
        let sink = RecordingSink::new();
        let by_ref: &dyn EventSink = &sink;
        (&by_ref).record(Level::Debug, "x", Value::Null);
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn level_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Level::Warn).unwrap(), "\"WARN\"");
    }
}
