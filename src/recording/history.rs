//! Bounded log of recent recording actions.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};

/// Default number of entries kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// What happened to a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Started,
    Stopped,
}

/// One recorded action, serialized the way the control endpoint reports it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub action: Action,
    /// Local time formatted as `YYYYMMDD_HHMMSS`
    pub timestamp: String,
    /// Base filename of the recording
    pub path: String,
    /// Wall-clock time as `HH:MM:SS`
    pub time: String,
    /// Session length, for `Stopped` entries
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_seconds"
    )]
    pub duration: Option<Duration>,
}

impl HistoryEntry {
    pub fn started(path: impl Into<String>, at: DateTime<Local>) -> Self {
        Self {
            action: Action::Started,
            timestamp: file_timestamp(at),
            path: path.into(),
            time: at.format("%H:%M:%S").to_string(),
            duration: None,
        }
    }

    pub fn stopped(path: impl Into<String>, at: DateTime<Local>, duration: Duration) -> Self {
        Self {
            action: Action::Stopped,
            timestamp: file_timestamp(at),
            path: path.into(),
            time: at.format("%H:%M:%S").to_string(),
            duration: Some(duration),
        }
    }
}

/// Timestamp used in recording filenames and history entries.
pub fn file_timestamp(at: DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Seconds with two decimals, e.g. `"12.34"`.
pub fn format_duration(duration: Duration) -> String {
    format!("{:.2}", duration.as_secs_f64())
}

fn serialize_seconds<S: Serializer>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match duration {
        Some(d) => serializer.serialize_str(&format_duration(*d)),
        None => serializer.serialize_none(),
    }
}

/// Fixed-capacity, insertion-ordered history.
///
/// Appending past capacity evicts the oldest entry. Snapshots are copies,
/// so readers never observe a partially applied append.
#[derive(Debug)]
pub struct HistoryLog {
    entries: Mutex<VecDeque<HistoryEntry>>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn append(&self, entry: HistoryEntry) {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Entries oldest-first.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
