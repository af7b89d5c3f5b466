//! Output value history rings
//!
//! Each output keeps a bounded chronological sequence of values, newest
//! first; the head is "latest". Retention is bounded both by age and by
//! entry count, whichever limit is exceeded first, and the latest entry is
//! always kept.

use crate::messaging::messages::{timestamp_now, OutputValue};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

/// Retention bounds of an output value history
#[derive(Debug, Clone, Copy)]
pub struct HistoryRetention {
    /// Entries older than this are dropped
    pub max_age: Duration,
    /// At most this many entries are kept
    pub max_count: usize,
}

impl Default for HistoryRetention {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(24 * 3600),
            max_count: 100,
        }
    }
}

#[derive(Default)]
struct ValuesInner {
    history_by_id: HashMap<String, VecDeque<OutputValue>>,
    updated: BTreeSet<String>,
}

/// Value histories of the outputs registered by this publisher
pub struct RegisteredOutputValues {
    retention: HistoryRetention,
    inner: Mutex<ValuesInner>,
}

impl Default for RegisteredOutputValues {
    fn default() -> Self {
        Self::new(HistoryRetention::default())
    }
}

impl RegisteredOutputValues {
    /// Create an empty value store with the given retention bounds
    pub fn new(retention: HistoryRetention) -> Self {
        Self {
            retention,
            inner: Mutex::new(ValuesInner::default()),
        }
    }

    /// Record a new value for an output
    ///
    /// The entry is timestamped here unless the caller provides one. The
    /// output is always marked updated; the returned flag tells whether the
    /// latest value actually differs from the previous one.
    pub fn update_output_value(
        &self,
        output_id: &str,
        value: &str,
        timestamp: Option<String>,
    ) -> bool {
        let mut inner = self.inner.lock();
        let history = inner
            .history_by_id
            .entry(output_id.to_string())
            .or_default();

        let changed = history.front().map(|latest| latest.value.as_str()) != Some(value);
        history.push_front(OutputValue {
            value: value.to_string(),
            timestamp: timestamp.unwrap_or_else(timestamp_now),
        });
        Self::apply_retention(history, &self.retention);

        inner.updated.insert(output_id.to_string());
        changed
    }

    /// Drop entries beyond the count or age bound, keeping the head
    fn apply_retention(history: &mut VecDeque<OutputValue>, retention: &HistoryRetention) {
        history.truncate(retention.max_count.max(1));

        let now = Local::now();
        while history.len() > 1 {
            let oldest = &history[history.len() - 1];
            let expired = match DateTime::parse_from_rfc3339(&oldest.timestamp) {
                Ok(ts) => {
                    let age = now.signed_duration_since(&ts);
                    age.to_std().map(|age| age > retention.max_age).unwrap_or(false)
                }
                // entries with unreadable timestamps cannot be age-checked
                Err(_) => true,
            };
            if !expired {
                break;
            }
            history.pop_back();
        }
    }

    /// Most recent value of an output
    pub fn get_latest(&self, output_id: &str) -> Option<OutputValue> {
        self.inner
            .lock()
            .history_by_id
            .get(output_id)
            .and_then(|history| history.front().cloned())
    }

    /// Newest-first snapshot of an output's retained values
    pub fn get_history(&self, output_id: &str) -> Vec<OutputValue> {
        self.inner
            .lock()
            .history_by_id
            .get(output_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Output IDs with new values since the last drain
    ///
    /// With `clear` the updated set is drained.
    pub fn get_updated_output_values(&self, clear: bool) -> Vec<String> {
        let mut inner = self.inner.lock();
        let updated: Vec<String> = inner.updated.iter().cloned().collect();
        if clear {
            inner.updated.clear();
        }
        updated
    }
}
