//! Bounded activity log.
//!
//! Operators read this through the management surface to see what the relay
//! has been doing recently. It is purely observational: nothing in the
//! delivery path depends on its contents.

use std::{
    collections::VecDeque,
    fmt::{Display, Formatter},
    sync::{Arc, LazyLock},
};

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Number of entries retained before the oldest are evicted.
pub const DEFAULT_CAPACITY: usize = 100;

static GLOBAL: LazyLock<Arc<ActivityLog>> = LazyLock::new(|| Arc::new(ActivityLog::new()));

/// The process-wide activity log.
#[must_use]
pub fn global() -> Arc<ActivityLog> {
    Arc::clone(&GLOBAL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp
    pub time: String,
    pub level: LogLevel,
    pub message: String,
}

impl Display for LogEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{:<5}] {}", self.time, self.level, self.message)
    }
}

/// Fixed-capacity ring buffer of [`LogEntry`] values.
#[derive(Debug)]
pub struct ActivityLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLog {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            level,
            message: message.into(),
        };

        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "pixelpost::activity", "{message}");
        self.record(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(target: "pixelpost::activity", "{message}");
        self.record(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(target: "pixelpost::activity", "{message}");
        self.record(LogLevel::Error, message);
    }

    /// Up to `limit` entries, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Every retained entry, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.recent(self.capacity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn newest_entries_come_first() {
        let log = ActivityLog::new();
        log.info("first");
        log.warn("second");
        log.error("third");

        let messages: Vec<_> = log.snapshot().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["third", "second", "first"]);
    }

    #[test]
    fn oldest_entry_is_evicted_at_capacity() {
        let log = ActivityLog::with_capacity(3);
        for i in 0..5 {
            log.info(format!("entry {i}"));
        }

        assert_eq!(log.len(), 3);
        let messages: Vec<_> = log.snapshot().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["entry 4", "entry 3", "entry 2"]);
    }

    #[test]
    fn entries_render_on_one_line() {
        let entry = LogEntry {
            time: "2023-11-14T22:13:20Z".to_string(),
            level: LogLevel::Info,
            message: "Sent 2 event(s) to meta".to_string(),
        };
        assert_eq!(
            entry.to_string(),
            "2023-11-14T22:13:20Z [info ] Sent 2 event(s) to meta"
        );
    }

    #[test]
    fn default_capacity_is_one_hundred() {
        let log = ActivityLog::new();
        for i in 0..150 {
            log.info(format!("{i}"));
        }
        assert_eq!(log.len(), DEFAULT_CAPACITY);
        assert_eq!(log.recent(1)[0].message, "149");
    }

    #[test]
    fn levels_are_recorded() {
        let log = ActivityLog::new();
        log.error("boom");
        let entry = &log.recent(1)[0];
        assert_eq!(entry.level, LogLevel::Error);
        assert!(entry.time.ends_with('Z'));
    }

    #[test]
    fn zero_capacity_keeps_one_entry() {
        let log = ActivityLog::with_capacity(0);
        log.info("a");
        log.info("b");
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.recent(10)[0].message, "b");
    }
}
