//! Per-document logging context.
//!
//! Every [`CrashDoc`](crate::doc::CrashDoc) owns one `SessionLog`. Entries go
//! to the `log` facade (target `crash::session`, prefixed with the document
//! name) and into a bounded ring that lives and dies with the session, so
//! diagnostics for one document never leak into another.

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::Level;

const TARGET: &str = "crash::session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SessionLog {
    document: String,
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl SessionLog {
    pub fn new(document: impl Into<String>, capacity: usize) -> Self {
        Self {
            document: document.into(),
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn record(&self, level: Level, message: impl Display) {
        let message = message.to_string();
        log::log!(target: TARGET, level, "[{}] {}", self.document, message);

        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            level,
            message,
            at: Utc::now(),
        });
    }

    pub fn trace(&self, message: impl Display) {
        self.record(Level::Trace, message);
    }

    pub fn debug(&self, message: impl Display) {
        self.record(Level::Debug, message);
    }

    pub fn info(&self, message: impl Display) {
        self.record(Level::Info, message);
    }

    pub fn warn(&self, message: impl Display) {
        self.record(Level::Warn, message);
    }

    pub fn error(&self, message: impl Display) {
        self.record(Level::Error, message);
    }

    /// Snapshot of retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Number of retained entries at `level` or more severe.
    pub fn count_at_least(&self, level: Level) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|entry| entry.level <= level)
            .count()
    }

    /// Whether any retained entry contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|entry| entry.message.contains(needle))
    }
}
