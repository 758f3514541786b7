//! JSONL run log.
//!
//! Every structured event of a cycle is appended to `runlog.jsonl`, one JSON
//! object per line: `{"event", "ts", "level", ...detail}`. [`AuditSink`] is
//! the [`EventSink`] the cycle records into; it also forwards to `log`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use alphabook::{EventSink, Level, LogSink};
use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// An event written to the run log.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent<'a> {
    pub event: &'a str,
    pub ts: DateTime<Utc>,
    pub level: Level,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// Append-only run-log writer.
pub struct AuditLog {
    writer: BufWriter<File>,
}

impl AuditLog {
    /// Open (or create) the log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Append one event. Non-object details are stored under `detail`.
    pub fn log(&mut self, level: Level, event: &str, detail: Value) -> Result<()> {
        let data = match detail {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("detail".into(), other);
                map
            }
        };
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            level,
            data,
        };
        let json = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Event sink writing to the run log and to `log`.
///
/// A failed write is downgraded to a `warn!`; recording never fails.
pub struct AuditSink {
    log: Option<Mutex<AuditLog>>,
}

impl AuditSink {
    pub fn new(log: AuditLog) -> Self {
        Self {
            log: Some(Mutex::new(log)),
        }
    }

    /// Open the run log, falling back to log-only output if that fails.
    pub fn open_or_log_only(path: &Path) -> Self {
        match AuditLog::open(path) {
            Ok(log) => Self::new(log),
            Err(e) => {
                warn!("Run log {} unavailable, events go to the logger only: {e}", path.display());
                Self::log_only()
            }
        }
    }

    pub fn log_only() -> Self {
        Self { log: None }
    }
}

impl EventSink for AuditSink {
    fn record(&self, level: Level, event: &str, detail: Value) {
        LogSink.record(level, event, detail.clone());
        let Some(log) = &self.log else {
            return;
        };
        let mut log = log.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = log.log(level, event, detail) {
            warn!("Run log write failed for {event}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn audit_log_writes_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runlog.jsonl");

        {
            let mut log = AuditLog::open(&path).unwrap();
            log.log(Level::Info, "cycle_started", json!({"trigger": "manual"}))
                .unwrap();
            log.log(Level::Warn, "odd_detail", json!([1, 2])).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "cycle_started");
        assert_eq!(lines[0]["level"], "INFO");
        assert_eq!(lines[0]["trigger"], "manual");
        assert!(lines[0]["ts"].is_string());
        assert_eq!(lines[1]["detail"], json!([1, 2]));
    }

    #[test]
    fn audit_log_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subdir").join("deep").join("runlog.jsonl");

        let mut log = AuditLog::open(&path).unwrap();
        log.log(Level::Debug, "test", Value::Null).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn sink_appends_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runlog.jsonl");
        let sink = AuditSink::open_or_log_only(&path);
        sink.info("a", json!({"n": 1}));
        sink.warn("b", json!({}));
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"event\":\"b\""));
    }

    #[test]
    fn log_only_sink_does_not_panic() {
        AuditSink::log_only().record(Level::Error, "boom", json!({"x": 1}));
    }
}
