//! In-memory ring buffer of recently received signals

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Number of signals kept
pub const HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRecord {
    /// Slide id carried by the signal
    pub signal: i64,
    /// Slide name, or `Signal <n>` when the id is not in the catalog
    pub name: String,
    /// Source device (`demo` for simulated signals)
    pub device: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SignalHistory {
    entries: VecDeque<SignalRecord>,
    capacity: usize,
}

impl SignalHistory {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record a signal, evicting the oldest entry when full
    pub fn push(&mut self, signal: i64, name: Option<&str>, device: &str) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(SignalRecord {
            signal,
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| format!("Signal {}", signal)),
            device: device.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Entries oldest first
    pub fn entries(&self) -> Vec<SignalRecord> {
        self.entries.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&SignalRecord> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SignalHistory {
    fn default() -> Self {
        Self::new()
    }
}
