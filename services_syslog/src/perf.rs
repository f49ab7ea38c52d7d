//! Performance marker log with triggered capture windows

use exec_types::{config, EsError, ResetType};
use serde::{Deserialize, Serialize};

const MASK_WORDS: usize = config::PERF_MAX_IDS / 32;

/// Capture state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerfState {
    /// Not collecting; the buffer holds the last completed window
    Idle,
    /// Armed, waiting for a trigger-mask marker
    Waiting,
    /// Collecting until the trigger mode's stop condition
    Triggered,
}

/// Where the capture window sits relative to the trigger point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Window starts at the trigger: stop when the buffer is full
    Start,
    /// Trigger centered: stop half a buffer past the trigger
    Center,
    /// Window ends on command: one more entry after `stop`
    End,
}

/// One captured marker event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfEntry {
    pub marker: u32,
    pub timestamp_ms: u64,
    pub data: u32,
}

/// The performance marker ring
pub struct PerfLog {
    buf: Vec<PerfEntry>,
    write_idx: usize,
    captured: usize,
    state: PerfState,
    mode: TriggerMode,
    filter_mask: [u32; MASK_WORDS],
    trigger_mask: [u32; MASK_WORDS],
    trigger_count: usize,
    stop_armed: bool,
    invalid_marker_count: u32,
}

fn mask_hit(mask: &[u32; MASK_WORDS], marker: u32) -> bool {
    let word = (marker / 32) as usize;
    let bit = marker % 32;
    mask[word] & (1 << bit) != 0
}

impl PerfLog {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(config::PERF_BUFFER_ENTRIES),
            write_idx: 0,
            captured: 0,
            state: PerfState::Idle,
            mode: TriggerMode::Start,
            filter_mask: [u32::MAX; MASK_WORDS],
            trigger_mask: [0; MASK_WORDS],
            trigger_count: 0,
            stop_armed: false,
            invalid_marker_count: 0,
        }
    }

    /// Re-initializes the meta state after a reset
    ///
    /// A power-on reset restores default masks (everything filtered
    /// in, nothing triggering) and drops the buffer; a processor reset
    /// keeps the captured window and masks but never resumes a capture
    /// that was in flight.
    pub fn reinit(&mut self, reset_type: ResetType) {
        if reset_type == ResetType::PowerOn {
            self.buf.clear();
            self.write_idx = 0;
            self.captured = 0;
            self.filter_mask = [u32::MAX; MASK_WORDS];
            self.trigger_mask = [0; MASK_WORDS];
            self.invalid_marker_count = 0;
        }
        self.trigger_count = 0;
        self.stop_armed = false;
        self.state = PerfState::Idle;
    }

    /// Arms a new capture window, discarding the previous one
    pub fn start(&mut self, mode: TriggerMode) {
        self.buf.clear();
        self.write_idx = 0;
        self.captured = 0;
        self.trigger_count = 0;
        self.stop_armed = false;
        self.mode = mode;
        self.state = PerfState::Waiting;
    }

    /// Ends collection
    ///
    /// In `End` mode while triggered this arms the one-entry grace
    /// period; in every other case collection halts immediately.
    pub fn stop(&mut self) {
        if self.state == PerfState::Triggered && self.mode == TriggerMode::End {
            self.stop_armed = true;
        } else {
            self.state = PerfState::Idle;
        }
    }

    /// Records a marker event
    ///
    /// A no-op outside WAITING/TRIGGERED, for markers outside the
    /// filter mask, and in WAITING for markers outside the trigger
    /// mask.
    pub fn add(&mut self, marker: u32, data: u32, timestamp_ms: u64) {
        if marker >= config::PERF_MAX_IDS as u32 {
            self.invalid_marker_count += 1;
            return;
        }
        if self.state == PerfState::Idle || !mask_hit(&self.filter_mask, marker) {
            return;
        }
        if self.state == PerfState::Waiting {
            if !mask_hit(&self.trigger_mask, marker) {
                return;
            }
            self.state = PerfState::Triggered;
        }

        let entry = PerfEntry {
            marker,
            timestamp_ms,
            data,
        };
        if self.buf.len() < config::PERF_BUFFER_ENTRIES {
            self.buf.push(entry);
        } else {
            self.buf[self.write_idx] = entry;
        }
        self.write_idx = (self.write_idx + 1) % config::PERF_BUFFER_ENTRIES;
        self.captured = (self.captured + 1).min(config::PERF_BUFFER_ENTRIES);
        self.trigger_count += 1;

        let stop = match self.mode {
            TriggerMode::Start => self.trigger_count >= config::PERF_BUFFER_ENTRIES,
            TriggerMode::Center => self.trigger_count >= config::PERF_BUFFER_ENTRIES / 2,
            TriggerMode::End => self.stop_armed,
        };
        if stop {
            self.state = PerfState::Idle;
        }
    }

    /// Replaces one 32-marker word of the filter mask
    pub fn set_filter_mask(&mut self, word: usize, value: u32) -> Result<(), EsError> {
        if word >= MASK_WORDS {
            return Err(EsError::BadArgument(format!(
                "filter mask word {word} out of range"
            )));
        }
        self.filter_mask[word] = value;
        Ok(())
    }

    /// Replaces one 32-marker word of the trigger mask
    pub fn set_trigger_mask(&mut self, word: usize, value: u32) -> Result<(), EsError> {
        if word >= MASK_WORDS {
            return Err(EsError::BadArgument(format!(
                "trigger mask word {word} out of range"
            )));
        }
        self.trigger_mask[word] = value;
        Ok(())
    }

    pub fn state(&self) -> PerfState {
        self.state
    }

    pub fn entry_count(&self) -> usize {
        self.captured
    }

    pub fn invalid_marker_count(&self) -> u32 {
        self.invalid_marker_count
    }

    /// Captured entries oldest first, for the dump job
    pub fn snapshot(&self) -> Vec<PerfEntry> {
        if self.buf.len() < config::PERF_BUFFER_ENTRIES {
            return self.buf.clone();
        }
        let mut out = Vec::with_capacity(self.buf.len());
        out.extend_from_slice(&self.buf[self.write_idx..]);
        out.extend_from_slice(&self.buf[..self.write_idx]);
        out
    }
}

impl Default for PerfLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed(mode: TriggerMode) -> PerfLog {
        let mut perf = PerfLog::new();
        perf.set_trigger_mask(0, 1).unwrap(); // marker 0 triggers
        perf.start(mode);
        perf
    }

    #[test]
    fn test_add_outside_capture_is_noop() {
        let mut perf = PerfLog::new();
        perf.add(1, 0, 0);
        assert_eq!(perf.entry_count(), 0);
        assert_eq!(perf.state(), PerfState::Idle);
    }

    #[test]
    fn test_filtered_marker_is_noop() {
        let mut perf = armed(TriggerMode::Start);
        perf.set_filter_mask(0, 0).unwrap();
        perf.add(0, 0, 0);
        assert_eq!(perf.state(), PerfState::Waiting);
        assert_eq!(perf.entry_count(), 0);
    }

    #[test]
    fn test_waiting_ignores_non_trigger_markers() {
        let mut perf = armed(TriggerMode::Start);
        perf.add(5, 0, 0);
        assert_eq!(perf.state(), PerfState::Waiting);
        assert_eq!(perf.entry_count(), 0);
    }

    #[test]
    fn test_start_mode_stops_at_full_buffer() {
        let mut perf = armed(TriggerMode::Start);
        perf.add(0, 0, 0);
        assert_eq!(perf.state(), PerfState::Triggered);
        for i in 1..config::PERF_BUFFER_ENTRIES {
            perf.add(1, 0, i as u64);
        }
        assert_eq!(perf.state(), PerfState::Idle);
        assert_eq!(perf.entry_count(), config::PERF_BUFFER_ENTRIES);

        // Further markers are dropped once idle
        perf.add(1, 0, 0);
        assert_eq!(perf.entry_count(), config::PERF_BUFFER_ENTRIES);
    }

    #[test]
    fn test_center_mode_stops_at_half_buffer_past_trigger() {
        let half = config::PERF_BUFFER_ENTRIES / 2;
        let mut perf = armed(TriggerMode::Center);
        perf.add(0, 0, 0);
        for i in 1..half - 1 {
            perf.add(1, 0, i as u64);
            assert_eq!(perf.state(), PerfState::Triggered);
        }
        assert_eq!(perf.entry_count(), half - 1);
        perf.add(1, 0, 0);
        assert_eq!(perf.state(), PerfState::Idle);
        assert_eq!(perf.entry_count(), half);
    }

    #[test]
    fn test_end_mode_takes_one_entry_after_stop() {
        let mut perf = armed(TriggerMode::End);
        perf.add(0, 0, 0);
        perf.add(1, 0, 1);
        assert_eq!(perf.state(), PerfState::Triggered);

        perf.stop();
        assert_eq!(perf.state(), PerfState::Triggered);
        perf.add(1, 7, 2);
        assert_eq!(perf.state(), PerfState::Idle);
        let snap = perf.snapshot();
        assert_eq!(snap.last().unwrap().data, 7);
    }

    #[test]
    fn test_stop_while_waiting_goes_idle() {
        let mut perf = armed(TriggerMode::Start);
        perf.stop();
        assert_eq!(perf.state(), PerfState::Idle);
    }

    #[test]
    fn test_mask_word_bounds_checked() {
        let mut perf = PerfLog::new();
        assert!(perf.set_filter_mask(MASK_WORDS, 0).is_err());
        assert!(perf.set_trigger_mask(MASK_WORDS, 0).is_err());
    }

    #[test]
    fn test_reinit_by_reset_type() {
        let mut perf = armed(TriggerMode::Start);
        perf.add(0, 0, 0);
        perf.add(1, 0, 1);

        perf.reinit(ResetType::Processor);
        assert_eq!(perf.state(), PerfState::Idle);
        assert_eq!(perf.entry_count(), 2);

        perf.reinit(ResetType::PowerOn);
        assert_eq!(perf.entry_count(), 0);
    }

    #[test]
    fn test_invalid_marker_counted() {
        let mut perf = armed(TriggerMode::Start);
        perf.add(config::PERF_MAX_IDS as u32, 0, 0);
        assert_eq!(perf.invalid_marker_count(), 1);
        assert_eq!(perf.entry_count(), 0);
    }
}
