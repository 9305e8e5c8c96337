use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Local};

/// Roughly 100 seconds of history for one target at one sweep per second.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// One rendered status line waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub target_name: String,
    pub address: String,
    pub status: String,
}

impl LogRecord {
    pub fn new(
        timestamp: DateTime<Local>,
        target_name: impl Into<String>,
        address: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            target_name: target_name.into(),
            address: address.into(),
            status: status.into(),
        }
    }
}

/// `HH:MM:SS | name | address | status`
impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {} | {}",
            self.timestamp.format("%H:%M:%S"),
            self.target_name,
            self.address,
            self.status
        )
    }
}

/// FIFO of records that drops its oldest entry once full.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    records: VecDeque<LogRecord>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a record, returning the one evicted to stay within capacity.
    pub fn push(&mut self, record: LogRecord) -> Option<LogRecord> {
        self.records.push_back(record);
        if self.records.len() > self.capacity {
            self.records.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// All records as newline-terminated lines, oldest first.
    pub fn to_batch(&self) -> String {
        self.records.iter().map(|record| format!("{record}\n")).collect()
    }
}
