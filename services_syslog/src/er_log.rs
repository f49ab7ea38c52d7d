//! Exception & Reset log

use exec_types::{config, ResetSubtype, ResetType};
use serde::{Deserialize, Serialize};

/// One exception or reset event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErLogEntry {
    /// Monotonic event counter, survives ring wrap
    pub log_counter: u32,
    pub reset_type: ResetType,
    pub reset_subtype: ResetSubtype,
    pub processor_reset_count: u32,
    pub description: String,
    pub timestamp_ms: u64,
}

/// Fixed-capacity ring of exception/reset records
pub struct ErLog {
    entries: Vec<ErLogEntry>,
    write_idx: usize,
    counter: u32,
}

impl ErLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(config::ER_LOG_ENTRIES),
            write_idx: 0,
            counter: 0,
        }
    }

    pub fn add(
        &mut self,
        reset_type: ResetType,
        reset_subtype: ResetSubtype,
        processor_reset_count: u32,
        description: &str,
        timestamp_ms: u64,
    ) {
        self.counter += 1;
        let entry = ErLogEntry {
            log_counter: self.counter,
            reset_type,
            reset_subtype,
            processor_reset_count,
            description: description.to_string(),
            timestamp_ms,
        };
        if self.entries.len() < config::ER_LOG_ENTRIES {
            self.entries.push(entry);
        } else {
            self.entries[self.write_idx] = entry;
        }
        self.write_idx = (self.write_idx + 1) % config::ER_LOG_ENTRIES;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.write_idx = 0;
        self.counter = 0;
    }

    /// Total events logged, including ones the ring has since dropped
    pub fn event_count(&self) -> u32 {
        self.counter
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered oldest first, for the dump job
    pub fn snapshot(&self) -> Vec<ErLogEntry> {
        if self.entries.len() < config::ER_LOG_ENTRIES {
            return self.entries.clone();
        }
        let mut out = Vec::with_capacity(self.entries.len());
        out.extend_from_slice(&self.entries[self.write_idx..]);
        out.extend_from_slice(&self.entries[..self.write_idx]);
        out
    }
}

impl Default for ErLog {
    fn default() -> Self {
        Self::new()
    }
}
