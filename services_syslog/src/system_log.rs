//! Flat byte ring buffer of timestamp-prefixed text messages

use exec_types::{config, EsError};

/// Behavior when an append would pass the end of the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysLogMode {
    /// Wrap the write index and keep logging over the oldest data
    Overwrite,
    /// Reject the write and leave the buffer untouched
    Discard,
}

/// Non-fatal append outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysLogStatus {
    Written,
    /// The message exceeded the per-message cap and was cut short
    Truncated,
    /// Empty messages are dropped without touching the buffer
    Skipped,
}

/// The system log
///
/// `write_idx` is where the next message lands; `end_idx` is the high
/// water mark of valid bytes. After a wrap the valid content is
/// `[write_idx..end_idx]` (older) followed by `[0..write_idx]` (newer).
pub struct SysLog {
    buf: Vec<u8>,
    write_idx: usize,
    end_idx: usize,
    mode: SysLogMode,
    entry_count: u64,
    wrapped: bool,
}

impl SysLog {
    pub fn new(mode: SysLogMode) -> Self {
        Self {
            buf: vec![0u8; config::SYSTEM_LOG_SIZE],
            write_idx: 0,
            end_idx: 0,
            mode,
            entry_count: 0,
            wrapped: false,
        }
    }

    /// Appends a timestamped message
    ///
    /// The message is capped at the smaller of `MAX_SYSLOG_MSG_SIZE`
    /// and half the buffer; exceeding the cap truncates in place and
    /// reports `Truncated` rather than failing. A full buffer in
    /// `Discard` mode is the only error path.
    pub fn append(&mut self, clock_ms: u64, message: &str) -> Result<SysLogStatus, EsError> {
        if message.is_empty() {
            return Ok(SysLogStatus::Skipped);
        }

        let mut line = format!(
            "{}.{:03}: {}",
            clock_ms / 1000,
            clock_ms % 1000,
            message
        );
        let cap = config::MAX_SYSLOG_MSG_SIZE.min(self.buf.len() / 2);
        let mut status = SysLogStatus::Written;
        if line.len() + 1 > cap {
            let mut cut = cap - 1;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            line.truncate(cut);
            status = SysLogStatus::Truncated;
        }
        line.push('\n');

        if self.write_idx + line.len() > self.buf.len() {
            match self.mode {
                SysLogMode::Discard => return Err(EsError::SysLogFull),
                SysLogMode::Overwrite => {
                    self.end_idx = self.write_idx;
                    self.write_idx = 0;
                    self.wrapped = true;
                }
            }
        }

        let bytes = line.as_bytes();
        self.buf[self.write_idx..self.write_idx + bytes.len()].copy_from_slice(bytes);
        self.write_idx += bytes.len();
        self.end_idx = self.end_idx.max(self.write_idx);
        self.entry_count += 1;
        Ok(status)
    }

    pub fn clear(&mut self) {
        self.buf.fill(0);
        self.write_idx = 0;
        self.end_idx = 0;
        self.entry_count = 0;
        self.wrapped = false;
    }

    pub fn set_mode(&mut self, mode: SysLogMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> SysLogMode {
        self.mode
    }

    pub fn write_index(&self) -> usize {
        self.write_idx
    }

    pub fn end_index(&self) -> usize {
        self.end_idx
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Bytes of valid content currently in the ring
    pub fn used_bytes(&self) -> usize {
        if self.wrapped {
            self.end_idx
        } else {
            self.write_idx
        }
    }

    /// Starts an incremental read over the current content
    ///
    /// After a wrap the oldest retained bytes start mid-message, so
    /// the read position is advanced to the next message boundary.
    pub fn read_start(&self) -> SysLogReader {
        if !self.wrapped {
            return SysLogReader {
                pos: 0,
                remaining: self.write_idx,
            };
        }

        let mut pos = self.write_idx;
        let mut skipped = 0;
        while pos < self.end_idx && self.buf[pos] != b'\n' {
            pos += 1;
            skipped += 1;
        }
        if pos < self.end_idx {
            pos += 1;
            skipped += 1;
        }
        SysLogReader {
            pos,
            remaining: (self.end_idx - self.write_idx) + self.write_idx - skipped,
        }
    }

    /// Copies the next chunk of log content into `out`
    ///
    /// Returns the number of bytes copied; zero means the reader is
    /// exhausted.
    pub fn read_data(&self, reader: &mut SysLogReader, out: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < out.len() && reader.remaining > 0 {
            if reader.pos >= self.end_idx {
                reader.pos = 0;
            }
            let run = (out.len() - copied)
                .min(reader.remaining)
                .min(self.end_idx - reader.pos);
            out[copied..copied + run].copy_from_slice(&self.buf[reader.pos..reader.pos + run]);
            reader.pos += run;
            reader.remaining -= run;
            copied += run;
        }
        copied
    }
}

/// Cursor state for the incremental read API
#[derive(Debug, Clone, Copy)]
pub struct SysLogReader {
    pos: usize,
    remaining: usize,
}

impl SysLogReader {
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}
